//! In-process record store

use super::types::{AgentSessionRecord, ConversationRecord, ScoreRecord};
use super::RecordStore;
use crate::error::RelayResult;
use async_trait::async_trait;
use parking_lot::Mutex;

/// Record store kept in memory, for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: Mutex<Vec<ConversationRecord>>,
    agent_sessions: Mutex<Vec<AgentSessionRecord>>,
    scores: Mutex<Vec<ScoreRecord>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conversations(conversations: Vec<ConversationRecord>) -> Self {
        let store = Self::default();
        *store.conversations.lock() = conversations;
        store
    }

    /// Number of save calls across all collections
    pub fn save_count(&self) -> usize {
        *self.saves.lock()
    }

    fn record_save(&self) {
        *self.saves.lock() += 1;
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn conversations(&self) -> RelayResult<Vec<ConversationRecord>> {
        Ok(self.conversations.lock().clone())
    }

    async fn save_conversations(&self, records: &[ConversationRecord]) -> RelayResult<()> {
        *self.conversations.lock() = records.to_vec();
        self.record_save();
        Ok(())
    }

    async fn agent_sessions(&self) -> RelayResult<Vec<AgentSessionRecord>> {
        Ok(self.agent_sessions.lock().clone())
    }

    async fn save_agent_sessions(&self, records: &[AgentSessionRecord]) -> RelayResult<()> {
        *self.agent_sessions.lock() = records.to_vec();
        self.record_save();
        Ok(())
    }

    async fn scores(&self) -> RelayResult<Vec<ScoreRecord>> {
        Ok(self.scores.lock().clone())
    }

    async fn save_scores(&self, records: &[ScoreRecord]) -> RelayResult<()> {
        *self.scores.lock() = records.to_vec();
        self.record_save();
        Ok(())
    }
}
