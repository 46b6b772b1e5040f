//! Decoded upstream records
//!
//! Payloads arrive either flat or wrapped in a `result` object. Both shapes are
//! decoded through [`Envelope`] in a fixed order (wrapped first) and flattened
//! into a [`RawEvent`].

use super::escape::decode_escaped_text;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Status value marking a completed reply
pub const STATUS_FINISH: &str = "finish";

/// Status value marking an upstream failure
pub const STATUS_ERROR: &str = "error";

/// One item produced by the frame parser
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamEvent {
    /// A decoded JSON record
    Record(RawEvent),
    /// The `[DONE]` sentinel
    Terminal,
}

/// A decoded upstream record; empty strings are normalized to `None`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEvent {
    pub status: Option<String>,
    pub conversation_id: Option<String>,
    pub history_id: Option<String>,
    /// `message.content.text` (or a string `message.content`), unescaped
    pub message_text: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RawEvent {
    /// Decode one JSON payload
    pub fn from_json(data: &str) -> serde_json::Result<Self> {
        let envelope: Envelope = serde_json::from_str(data)?;
        Ok(envelope.into_payload().into())
    }

    /// Explicit error status or a non-empty `last_error` field
    pub fn is_error(&self) -> bool {
        self.status.as_deref() == Some(STATUS_ERROR)
            || self.error_code.is_some()
            || self.error_message.is_some()
    }

    pub fn is_finish(&self) -> bool {
        self.status.as_deref() == Some(STATUS_FINISH)
    }

    /// Message for the client: upstream message, else code, else `"error"`
    pub fn error_text(&self) -> String {
        self.error_message
            .clone()
            .or_else(|| self.error_code.clone())
            .unwrap_or_else(|| STATUS_ERROR.to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Wrapped { result: Payload },
    Flat(Payload),
}

impl Envelope {
    fn into_payload(self) -> Payload {
        match self {
            Self::Wrapped { result } => result,
            Self::Flat(payload) => payload,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default, deserialize_with = "string_only")]
    status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    conversation_id: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    history_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<MessageBody>,
    #[serde(default, deserialize_with = "lenient")]
    last_error: Option<LastError>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageBody {
    #[serde(default)]
    content: Option<MessageContent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MessageContent {
    Plain(String),
    Structured {
        #[serde(default, deserialize_with = "string_only")]
        text: Option<String>,
    },
    Other(#[allow(dead_code)] Value),
}

impl MessageContent {
    fn text(self) -> Option<String> {
        match self {
            Self::Plain(text) => Some(text),
            Self::Structured { text } => text,
            Self::Other(_) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct LastError {
    #[serde(default, deserialize_with = "string_only")]
    error_code: Option<String>,
    #[serde(default, deserialize_with = "string_only")]
    error_msg: Option<String>,
}

impl From<Payload> for RawEvent {
    fn from(payload: Payload) -> Self {
        let message_text = payload
            .message
            .and_then(|m| m.content)
            .and_then(MessageContent::text)
            .filter(|t| !t.is_empty())
            .map(|t| decode_escaped_text(&t));
        let last_error = payload.last_error.unwrap_or_default();

        Self {
            status: payload.status,
            conversation_id: payload.conversation_id,
            history_id: payload.history_id,
            message_text,
            error_code: last_error.error_code,
            error_message: last_error.error_msg,
        }
    }
}

/// Accept only non-empty strings; any other JSON value reads as `None`
fn string_only<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

/// Nested objects of an unexpected shape read as `None` instead of failing the record
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Identifiers may be sent as strings or numbers
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_payload() {
        let event = RawEvent::from_json(
            r#"{"result":{"status":"init","conversation_id":"c1","history_id":"h1",
                "message":{"content":{"type":"text","text":"您好"}}}}"#,
        )
        .unwrap();
        assert_eq!(event.status.as_deref(), Some("init"));
        assert_eq!(event.conversation_id.as_deref(), Some("c1"));
        assert_eq!(event.history_id.as_deref(), Some("h1"));
        assert_eq!(event.message_text.as_deref(), Some("您好"));
        assert!(!event.is_error());
    }

    #[test]
    fn test_flat_payload_with_string_content() {
        let event =
            RawEvent::from_json(r#"{"status":"finish","message":{"content":"完成"}}"#).unwrap();
        assert!(event.is_finish());
        assert_eq!(event.message_text.as_deref(), Some("完成"));
    }

    #[test]
    fn test_numeric_history_id() {
        let event = RawEvent::from_json(r#"{"history_id": 1024}"#).unwrap();
        assert_eq!(event.history_id.as_deref(), Some("1024"));
    }

    #[test]
    fn test_empty_text_is_absent() {
        let event =
            RawEvent::from_json(r#"{"message":{"content":{"type":"text","text":""}}}"#).unwrap();
        assert_eq!(event.message_text, None);

        let event = RawEvent::from_json(r#"{"message":{"content":{"type":"image"}}}"#).unwrap();
        assert_eq!(event.message_text, None);

        let event = RawEvent::from_json(r#"{"message":{"content":[1,2]}}"#).unwrap();
        assert_eq!(event.message_text, None);

        let event = RawEvent::from_json(r#"{"status":"finish","message":"oops"}"#).unwrap();
        assert!(event.is_finish());
        assert_eq!(event.message_text, None);
    }

    #[test]
    fn test_escaped_text_is_decoded() {
        let event =
            RawEvent::from_json(r#"{"message":{"content":{"text":"\\u60a8\\u597d\\n"}}}"#)
                .unwrap();
        assert_eq!(event.message_text.as_deref(), Some("您好\n"));
    }

    #[test]
    fn test_last_error_signals() {
        let event = RawEvent::from_json(
            r#"{"result":{"status":"running","last_error":{"error_code":"","error_msg":"额度不足"}}}"#,
        )
        .unwrap();
        assert!(event.is_error());
        assert_eq!(event.error_text(), "额度不足");

        let event =
            RawEvent::from_json(r#"{"last_error":{"error_code":"E42","error_msg":null}}"#).unwrap();
        assert!(event.is_error());
        assert_eq!(event.error_text(), "E42");

        let event = RawEvent::from_json(r#"{"status":"error"}"#).unwrap();
        assert!(event.is_error());
        assert_eq!(event.error_text(), "error");

        let event = RawEvent::from_json(r#"{"last_error":{"error_code":"","error_msg":""}}"#)
            .unwrap();
        assert!(!event.is_error());
    }

    #[test]
    fn test_non_object_payload_fails() {
        assert!(RawEvent::from_json("42").is_err());
        assert!(RawEvent::from_json("{broken").is_err());
    }
}
