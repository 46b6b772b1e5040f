//! Upstream event-stream framing
//!
//! This module provides a buffered parser for the assistant API's
//! `data: <json|[DONE]>\n\n` stream that handles:
//! - Frames split across network reads
//! - Incomplete UTF-8 sequences across chunk boundaries
//! - Undecodable payload lines (dropped without aborting the stream)

mod escape;
mod event;

pub use escape::{decode_escaped_text, escape_for_display};
pub use event::{RawEvent, UpstreamEvent};

use tracing::{debug, trace};

/// Payload prefix of a data line
const DATA_PREFIX: &str = "data:";

/// Payload marking the end of the upstream stream
pub const DONE_SENTINEL: &str = "[DONE]";

/// Longest payload preview written to trace logs
const TRACE_PREVIEW_CHARS: usize = 2000;

/// Buffered frame parser that handles partial chunks
///
/// Only data up to the last complete frame boundary (`\n\n` or `\r\n\r\n`) is
/// parsed; the remainder stays buffered for the next [`FrameParser::feed`].
#[derive(Debug, Default)]
pub struct FrameParser {
    /// Text after the last complete frame boundary
    buffer: String,
    /// Incomplete UTF-8 byte sequence at the end of the last chunk
    incomplete_utf8: Vec<u8>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and extract the events of every complete frame
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<UpstreamEvent> {
        let bytes_to_decode = if self.incomplete_utf8.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.incomplete_utf8);
            combined.extend_from_slice(chunk);
            combined
        };

        let (text, partial) = Self::split_utf8(&bytes_to_decode);
        self.incomplete_utf8 = partial;
        self.buffer.push_str(&text);

        let mut events = Vec::new();
        while let Some((end, delimiter_len)) = self.find_frame_boundary() {
            let frame: String = self.buffer.drain(..end + delimiter_len).collect();
            Self::parse_frame(&frame[..end], &mut events);
        }
        events
    }

    /// Feed text; convenience for callers that already hold decoded input
    pub fn feed_str(&mut self, text: &str) -> Vec<UpstreamEvent> {
        self.feed(text.as_bytes())
    }

    /// Parse whatever is left once the upstream closed the connection.
    ///
    /// A trailing frame without its blank-line terminator is still a complete
    /// record once no more bytes can arrive.
    pub fn finish(&mut self) -> Vec<UpstreamEvent> {
        let mut tail = std::mem::take(&mut self.buffer);
        if !self.incomplete_utf8.is_empty() {
            tail.push_str(&String::from_utf8_lossy(&std::mem::take(
                &mut self.incomplete_utf8,
            )));
        }

        let mut events = Vec::new();
        if !tail.trim().is_empty() {
            Self::parse_frame(&tail, &mut events);
        }
        events
    }

    #[cfg(test)]
    fn has_remaining(&self) -> bool {
        !self.buffer.is_empty() || !self.incomplete_utf8.is_empty()
    }

    /// Decode as much of `bytes` as possible.
    ///
    /// A character cut off at the end is returned as raw bytes to be completed
    /// by the next chunk; invalid sequences elsewhere become U+FFFD.
    fn split_utf8(bytes: &[u8]) -> (String, Vec<u8>) {
        let mut text = String::with_capacity(bytes.len());
        let mut rest = bytes;
        loop {
            let err = match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    return (text, Vec::new());
                }
                Err(err) => err,
            };
            let (valid, tail) = rest.split_at(err.valid_up_to());
            text.push_str(std::str::from_utf8(valid).unwrap_or_default());
            match err.error_len() {
                None => return (text, tail.to_vec()),
                Some(len) => {
                    debug!("replacing invalid UTF-8 in upstream chunk");
                    text.push(char::REPLACEMENT_CHARACTER);
                    rest = &tail[len..];
                }
            }
        }
    }

    /// Position and length of the earliest frame delimiter
    fn find_frame_boundary(&self) -> Option<(usize, usize)> {
        let lf = self.buffer.find("\n\n").map(|pos| (pos, 2));
        let crlf = self.buffer.find("\r\n\r\n").map(|pos| (pos, 4));
        match (lf, crlf) {
            (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
            (a, b) => a.or(b),
        }
    }

    /// Turn every data line of one frame into an event
    fn parse_frame(frame: &str, events: &mut Vec<UpstreamEvent>) {
        for line in frame.lines() {
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();
            if payload.is_empty() {
                continue;
            }

            if tracing::enabled!(tracing::Level::TRACE) {
                let preview: String = payload.chars().take(TRACE_PREVIEW_CHARS).collect();
                trace!("upstream data: {}", escape_for_display(&preview));
            }

            if payload == DONE_SENTINEL {
                events.push(UpstreamEvent::Terminal);
                continue;
            }

            match RawEvent::from_json(payload) {
                Ok(event) => events.push(UpstreamEvent::Record(event)),
                Err(e) => debug!("dropping undecodable upstream line: {}", e),
            }
        }
    }
}
