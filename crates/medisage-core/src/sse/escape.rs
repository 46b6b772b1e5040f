//! Text escaping helpers for upstream payloads

/// Decode backslash escapes the upstream sometimes leaves in message text.
///
/// Handles `\uXXXX` (including surrogate pairs) followed by `\n`, `\r` and
/// `\t`. Text without a backslash is returned unchanged.
pub fn decode_escaped_text(input: &str) -> String {
    if !input.contains('\\') {
        return input.to_string();
    }

    let mut out = if input.contains("\\u") {
        decode_unicode_escapes(input)
    } else {
        input.to_string()
    };

    if out.contains("\\n") || out.contains("\\r") || out.contains("\\t") {
        out = out
            .replace("\\n", "\n")
            .replace("\\r", "\r")
            .replace("\\t", "\t");
    }
    out
}

fn decode_unicode_escapes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find("\\u") {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 2..];

        let Some(high) = parse_hex4(after) else {
            out.push_str("\\u");
            rest = after;
            continue;
        };

        if (0xD800..0xDC00).contains(&high) {
            let low = after[4..]
                .strip_prefix("\\u")
                .and_then(parse_hex4)
                .filter(|low| (0xDC00..0xE000).contains(low));
            if let Some(low) = low {
                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                if let Some(ch) = char::from_u32(code) {
                    out.push(ch);
                    rest = &after[10..];
                    continue;
                }
            }
            // Lone surrogate: keep the escape as written.
            out.push_str(&rest[pos..pos + 6]);
            rest = &after[4..];
            continue;
        }

        match char::from_u32(high) {
            Some(ch) => out.push(ch),
            None => out.push_str(&rest[pos..pos + 6]),
        }
        rest = &after[4..];
    }

    out.push_str(rest);
    out
}

fn parse_hex4(s: &str) -> Option<u32> {
    let digits = s.get(..4)?;
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// Make control characters visible for log output.
pub fn escape_for_display(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
