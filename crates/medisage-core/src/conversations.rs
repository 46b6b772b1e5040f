//! Conversation bookkeeping
//!
//! Operations over the stored collections on behalf of an already
//! authenticated user: creating and deleting conversations, listing the
//! sidebar entries and reading score reports.

use crate::config::{AgentProfile, RelayConfig, find_agents, load_agents};
use crate::error::{RelayError, RelayResult};
use crate::store::{
    AgentSessionRecord, ConversationRecord, RecordStore, ScoreRecord, find_owned, now_millis,
    upsert_agent_session,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Title used when neither a title nor an agent name is available
pub const DEFAULT_TITLE: &str = "新问诊";

/// Derive a title that does not clash with `existing`.
///
/// Clashes are resolved with a full-width `（N）` suffix one past the largest
/// suffix already in use.
pub fn make_unique_title<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let root = match base.trim() {
        "" => DEFAULT_TITLE,
        trimmed => trimmed,
    };

    let mut has_root = false;
    let mut max_suffix: u64 = 0;
    for title in existing {
        let title = title.as_ref();
        if title == root {
            has_root = true;
            continue;
        }
        if let Some(n) = numbered_suffix(title, root) {
            max_suffix = max_suffix.max(n);
        }
    }

    if !has_root && max_suffix == 0 {
        return root.to_string();
    }
    format!("{}（{}）", root, (max_suffix + 1).max(1))
}

fn numbered_suffix(title: &str, root: &str) -> Option<u64> {
    let digits = title
        .strip_prefix(root)?
        .strip_prefix('（')?
        .strip_suffix('）')?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Store-backed conversation operations
#[derive(Clone)]
pub struct ConversationService {
    config: Arc<RelayConfig>,
    store: Arc<dyn RecordStore>,
}

impl ConversationService {
    pub fn new(config: Arc<RelayConfig>, store: Arc<dyn RecordStore>) -> Self {
        Self { config, store }
    }

    /// Create a conversation bound to the named agent (or the first one)
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: Option<&str>,
        agent_name: Option<&str>,
    ) -> RelayResult<ConversationRecord> {
        let agents = load_agents(&self.config).await;
        let agent = pick_agent(&agents, agent_name)?;

        let mut conversations = self.store.conversations().await?;
        let existing: Vec<&str> = conversations
            .iter()
            .filter(|c| c.is_owned_by(user_id))
            .map(|c| c.title.as_str())
            .collect();
        let base = title
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(agent.name.as_str());
        let title = make_unique_title(base, &existing);

        let now = now_millis();
        let mut record = ConversationRecord::new(user_id, title, now);
        record.agent_id = Some(agent.id.clone());
        record.agent_name = Some(agent.name.clone());

        conversations.push(record.clone());
        self.store.save_conversations(&conversations).await?;
        upsert_agent_session(self.store.as_ref(), &record, now).await?;

        info!(conversation_id = %record.id, title = %record.title, agent_id = %agent.id, "conversation created");
        Ok(record)
    }

    pub async fn list_conversations(&self, user_id: &str) -> RelayResult<Vec<ConversationRecord>> {
        let conversations = self.store.conversations().await?;
        Ok(conversations
            .into_iter()
            .filter(|c| c.is_owned_by(user_id))
            .collect())
    }

    pub async fn get_conversation(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> RelayResult<ConversationRecord> {
        let mut conversations = self.store.conversations().await?;
        let index = find_owned(&conversations, user_id, conversation_id)?;
        Ok(conversations.swap_remove(index))
    }

    /// Delete a conversation with its sidebar entry and the user's scores for it
    pub async fn delete_conversation(&self, user_id: &str, conversation_id: &str) -> RelayResult<()> {
        let mut conversations = self.store.conversations().await?;
        let index = find_owned(&conversations, user_id, conversation_id)?;
        conversations.remove(index);
        self.store.save_conversations(&conversations).await?;

        let mut sessions = self.store.agent_sessions().await?;
        let before = sessions.len();
        sessions.retain(|s| s.conversation_id != conversation_id);
        if sessions.len() != before {
            self.store.save_agent_sessions(&sessions).await?;
        }

        let mut scores = self.store.scores().await?;
        let before = scores.len();
        scores.retain(|s| !(s.conversation_id == conversation_id && s.user_id == user_id));
        if scores.len() != before {
            self.store.save_scores(&scores).await?;
        }

        info!(%conversation_id, removed_scores = before - scores.len(), "conversation deleted");
        Ok(())
    }

    /// Sidebar entries of the user's conversations, newest first.
    ///
    /// Conversations without an entry get one backfilled from their own fields.
    pub async fn list_agent_sessions(&self, user_id: &str) -> RelayResult<Vec<AgentSessionRecord>> {
        let conversations = self.list_conversations(user_id).await?;
        let mut sessions = self.store.agent_sessions().await?;
        let now = now_millis();

        let mut backfilled = 0usize;
        for conv in &conversations {
            if sessions.iter().any(|s| s.conversation_id == conv.id) {
                continue;
            }
            let created_at = if conv.created_at > 0 { conv.created_at } else { now };
            let updated_at = if conv.updated_at > 0 { conv.updated_at } else { created_at };
            sessions.push(AgentSessionRecord {
                conversation_id: conv.id.clone(),
                agent_id: conv.agent_id.clone(),
                agent_name: conv.agent_name.clone(),
                created_at,
                updated_at,
            });
            backfilled += 1;
        }
        if backfilled > 0 {
            debug!(backfilled, "backfilled agent sessions");
            self.store.save_agent_sessions(&sessions).await?;
        }

        let mut owned: Vec<AgentSessionRecord> = sessions
            .into_iter()
            .filter(|s| conversations.iter().any(|c| c.id == s.conversation_id))
            .collect();
        owned.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(owned)
    }

    /// The user's score reports, newest first
    pub async fn list_scores(&self, user_id: &str) -> RelayResult<Vec<ScoreRecord>> {
        let mut scores: Vec<ScoreRecord> = self
            .store
            .scores()
            .await?
            .into_iter()
            .filter(|s| s.user_id == user_id)
            .collect();
        scores.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(scores)
    }

    pub async fn get_score(&self, user_id: &str, score_id: &str) -> RelayResult<ScoreRecord> {
        self.store
            .scores()
            .await?
            .into_iter()
            .find(|s| s.id == score_id && s.user_id == user_id)
            .ok_or_else(|| {
                RelayError::not_found_resource(format!("score {} not found", score_id), "score")
            })
    }

    /// Agents with their canned questions; a selector narrows to one agent
    pub async fn predefined_questions(
        &self,
        agent_id: Option<&str>,
        agent_name: Option<&str>,
    ) -> RelayResult<Vec<AgentProfile>> {
        let agents = load_agents(&self.config).await;
        let found: Vec<AgentProfile> = find_agents(&agents, agent_id, agent_name)
            .into_iter()
            .cloned()
            .collect();

        let has_selector = [agent_id, agent_name]
            .iter()
            .any(|s| s.is_some_and(|v| !v.trim().is_empty()));
        if has_selector && found.is_empty() {
            let which = agent_id.or(agent_name).unwrap_or_default();
            return Err(RelayError::not_found_resource(
                format!("agent {} not found", which.trim()),
                "agent",
            ));
        }
        Ok(found)
    }
}

fn pick_agent<'a>(agents: &'a [AgentProfile], name: Option<&str>) -> RelayResult<&'a AgentProfile> {
    let named = name
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|n| agents.iter().find(|a| a.name == n));
    named.or_else(|| agents.first()).ok_or_else(|| {
        RelayError::config_with_context(
            "Missing agents list",
            "Add agents to the config file or to agents.json in the data directory",
        )
    })
}
