//! Upstream error body sanitization

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MAX_ERROR_TEXT_CHARS: usize = 1_024;
const REDACTED: &str = "[REDACTED]";

static BEARER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._\-+/=]{8,}").expect("valid bearer token regex")
});

static KEY_VALUE_SECRET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(api[_-]?key|api[_-]?secret|access[_-]?token|token|secret|authorization)\b\s*[:=]\s*["']?[^"',\s}]+"#,
    )
    .expect("valid key/value secret regex")
});

/// Redact credentials in an upstream error body and cap its length
pub fn sanitize_provider_error_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "<empty error response body>".to_string();
    }

    if let Ok(mut json) = serde_json::from_str::<Value>(trimmed) {
        redact_json(&mut json);
        let serialized =
            serde_json::to_string(&json).unwrap_or_else(|_| "<unserializable error>".to_string());
        return cap_length(serialized);
    }

    cap_length(redact_inline_secrets(trimmed))
}

/// First non-empty `message`, `error` or `msg` field of a JSON error body
pub(crate) fn error_body_message(raw: &str) -> Option<String> {
    let json: Value = serde_json::from_str(raw.trim()).ok()?;
    ["message", "error", "msg"]
        .iter()
        .filter_map(|key| json.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(redact_inline_secrets)
}

fn redact_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if is_sensitive_key(key) {
                    *val = Value::String(REDACTED.to_string());
                } else {
                    redact_json(val);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_json),
        Value::String(s) => *s = redact_inline_secrets(s),
        _ => {}
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.to_ascii_lowercase().replace(['-', ' '], "_");
    ["api_key", "api_secret", "token", "secret", "authorization"]
        .iter()
        .any(|needle| normalized.contains(needle))
}

fn redact_inline_secrets(input: &str) -> String {
    let redacted_bearer = BEARER_TOKEN_RE.replace_all(input, "Bearer [REDACTED]");
    KEY_VALUE_SECRET_RE
        .replace_all(&redacted_bearer, "$1=[REDACTED]")
        .into_owned()
}

fn cap_length(input: String) -> String {
    let char_count = input.chars().count();
    if char_count <= MAX_ERROR_TEXT_CHARS {
        return input;
    }

    let truncated: String = input.chars().take(MAX_ERROR_TEXT_CHARS).collect();
    format!(
        "{}... [truncated {} chars]",
        truncated,
        char_count - MAX_ERROR_TEXT_CHARS
    )
}
