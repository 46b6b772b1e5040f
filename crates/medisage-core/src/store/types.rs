//! Persistent record shapes
//!
//! Field names are camelCase on disk so that the files stay compatible with
//! the web front end that shares the data directory.

use crate::scoring::{KeywordCoverage, ScoreItem, ScoreTable};
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Epoch milliseconds
pub type Timestamp = i64;

pub fn now_millis() -> Timestamp {
    Utc::now().timestamp_millis()
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Upstream session correlation id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_conversation_id: Option<String>,
    /// Upstream id of the latest turn
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_last_history_id: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl ConversationRecord {
    pub fn new(user_id: impl Into<String>, title: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: new_id(),
            user_id: user_id.into(),
            title: title.into(),
            agent_id: None,
            agent_name: None,
            agent_conversation_id: None,
            agent_last_history_id: None,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    pub fn message_mut(&mut self, message_id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == message_id)
    }

    /// All message texts joined by a space
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    /// Greeting turn triggered without a user message
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub init: bool,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>, ts: Timestamp) -> Self {
        Self {
            id: new_id(),
            role: MessageRole::User,
            text: text.into(),
            ts,
            agent_id: None,
            agent_name: None,
            init: false,
        }
    }

    /// Empty assistant message to be filled while streaming
    pub fn pending_reply(agent_id: &str, agent_name: &str, init: bool, ts: Timestamp) -> Self {
        Self {
            id: new_id(),
            role: MessageRole::Ai,
            text: String::new(),
            ts,
            agent_id: Some(agent_id.to_string()),
            agent_name: Some(agent_name.to_string()),
            init,
        }
    }
}

/// Sidebar entry linking a conversation to its agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSessionRecord {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Timestamp,
}

/// How a score record was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoreMode {
    /// Graded by the assistant as a Markdown table
    #[serde(rename = "agent-table")]
    AgentTable,
    /// Keyword coverage of the conversation
    #[serde(rename = "fallback")]
    Fallback,
}

impl std::fmt::Display for ScoreMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AgentTable => write!(f, "agent-table"),
            Self::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreRecord {
    pub id: String,
    pub user_id: String,
    pub conversation_id: String,
    pub mode: ScoreMode,
    pub total_score: Option<f64>,
    #[serde(default)]
    pub report_markdown: String,
    #[serde(default)]
    pub items: Vec<ScoreItem>,
    #[serde(default)]
    pub table: ScoreTable,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<KeywordCoverage>,
    #[serde(default)]
    pub created_at: Timestamp,
}
