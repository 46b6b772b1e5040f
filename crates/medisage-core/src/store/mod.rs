//! Record store collaborator
//!
//! Three flat collections (conversations, agent sessions, scores) that are
//! read and saved as whole snapshots. Concurrent writers are last-writer-wins.

mod json_file;
mod memory;
pub mod types;

pub use json_file::JsonFileStore;
pub use memory::MemoryStore;
pub use types::{
    AgentSessionRecord, ChatMessage, ConversationRecord, MessageRole, ScoreMode, ScoreRecord,
    Timestamp, new_id, now_millis,
};

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;

/// Snapshot read/write access to the persisted collections
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn conversations(&self) -> RelayResult<Vec<ConversationRecord>>;

    async fn save_conversations(&self, records: &[ConversationRecord]) -> RelayResult<()>;

    async fn agent_sessions(&self) -> RelayResult<Vec<AgentSessionRecord>>;

    async fn save_agent_sessions(&self, records: &[AgentSessionRecord]) -> RelayResult<()>;

    async fn scores(&self) -> RelayResult<Vec<ScoreRecord>>;

    async fn save_scores(&self, records: &[ScoreRecord]) -> RelayResult<()>;
}

/// Index of the conversation `conversation_id` owned by `user_id`
pub fn find_owned(
    conversations: &[ConversationRecord],
    user_id: &str,
    conversation_id: &str,
) -> RelayResult<usize> {
    conversations
        .iter()
        .position(|c| c.id == conversation_id && c.is_owned_by(user_id))
        .ok_or_else(|| {
            RelayError::not_found_resource(
                format!("conversation {} not found", conversation_id),
                "conversation",
            )
        })
}

/// Insert or refresh the sidebar entry for `conversation`.
///
/// Repeated calls only move `updatedAt` forward and copy the current agent.
pub async fn upsert_agent_session(
    store: &dyn RecordStore,
    conversation: &ConversationRecord,
    now: Timestamp,
) -> RelayResult<AgentSessionRecord> {
    let mut sessions = store.agent_sessions().await?;
    let created_at = if conversation.created_at > 0 {
        conversation.created_at
    } else {
        now
    };

    let entry = match sessions
        .iter_mut()
        .find(|s| s.conversation_id == conversation.id)
    {
        Some(existing) => {
            existing.agent_id = conversation.agent_id.clone();
            existing.agent_name = conversation.agent_name.clone();
            if existing.created_at == 0 {
                existing.created_at = created_at;
            }
            existing.updated_at = now;
            existing.clone()
        }
        None => {
            let entry = AgentSessionRecord {
                conversation_id: conversation.id.clone(),
                agent_id: conversation.agent_id.clone(),
                agent_name: conversation.agent_name.clone(),
                created_at,
                updated_at: now,
            };
            sessions.push(entry.clone());
            entry
        }
    };

    store.save_agent_sessions(&sessions).await?;
    Ok(entry)
}
