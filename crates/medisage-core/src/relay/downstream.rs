//! Events sent to the downstream consumer
//!
//! The downstream uses the same `data: <json>\n\n` framing as the upstream and
//! ends every session with a `data: [DONE]\n\n` frame.

use crate::sse::DONE_SENTINEL;
use crate::store::ScoreMode;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One normalized event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DownstreamEvent {
    Meta(MetaInfo),
    Delta { delta: String },
    Error { error: String },
    Done(DoneInfo),
}

/// Session metadata; only the fields relevant to the moment are set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Upstream session correlation id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Local conversation id (scoring sessions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conv_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_id: Option<String>,
}

/// Completion details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoneInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<ScoreMode>,
}

impl DownstreamEvent {
    pub fn agent(agent_id: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self::Meta(MetaInfo {
            agent_id: Some(agent_id.into()),
            agent_name: Some(agent_name.into()),
            ..Default::default()
        })
    }

    pub fn upstream_conversation(conversation_id: impl Into<String>) -> Self {
        Self::Meta(MetaInfo {
            conversation_id: Some(conversation_id.into()),
            ..Default::default()
        })
    }

    pub fn score_started(conv_id: impl Into<String>, score_id: impl Into<String>) -> Self {
        Self::Meta(MetaInfo {
            conv_id: Some(conv_id.into()),
            score_id: Some(score_id.into()),
            ..Default::default()
        })
    }

    pub fn delta(delta: impl Into<String>) -> Self {
        Self::Delta {
            delta: delta.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }

    /// `conversation_id` is the upstream session id, when one was assigned
    pub fn chat_done(conversation_id: Option<String>, message_id: impl Into<String>) -> Self {
        Self::Done(DoneInfo {
            conversation_id,
            message_id: Some(message_id.into()),
            ..Default::default()
        })
    }

    pub fn score_done(score_id: impl Into<String>, mode: ScoreMode) -> Self {
        Self::Done(DoneInfo {
            score_id: Some(score_id.into()),
            mode: Some(mode),
            ..Default::default()
        })
    }
}

/// A frame on the downstream wire
#[derive(Debug, Clone, PartialEq)]
pub enum DownstreamFrame {
    Event(DownstreamEvent),
    /// Closing `[DONE]` sentinel
    End,
}

impl From<DownstreamEvent> for DownstreamFrame {
    fn from(event: DownstreamEvent) -> Self {
        Self::Event(event)
    }
}

impl DownstreamFrame {
    /// Encode as `data: ...\n\n`
    pub fn encode(&self) -> String {
        match self {
            Self::End => format!("data: {}\n\n", DONE_SENTINEL),
            Self::Event(event) => match serde_json::to_string(event) {
                Ok(json) => format!("data: {}\n\n", json),
                Err(e) => {
                    warn!("failed to encode downstream event: {}", e);
                    "data: {\"type\":\"error\",\"error\":\"encoding failed\"}\n\n".to_string()
                }
            },
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Self::End)
    }
}

/// Decode downstream text back into frames.
///
/// Payloads that are not valid events are skipped.
pub fn decode_frames(text: &str) -> Vec<DownstreamFrame> {
    text.split("\n\n")
        .flat_map(str::lines)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|payload| !payload.is_empty())
        .filter_map(|payload| {
            if payload == DONE_SENTINEL {
                Some(DownstreamFrame::End)
            } else {
                serde_json::from_str(payload).ok().map(DownstreamFrame::Event)
            }
        })
        .collect()
}
