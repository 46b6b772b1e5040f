//! Follow-up prompt suggestions
//!
//! The upstream proposes next questions for an ongoing session; they are
//! cleaned up here before being shown to the trainee.

use crate::config::AgentRegistry;
use crate::error::{RelayError, RelayResult};
use crate::relay::RelayContext;
use crate::sse::decode_escaped_text;
use crate::store::{find_owned, now_millis};
use crate::upstream::SuggestRequest;
use tracing::{debug, instrument};

/// Upper bound on returned suggestions
pub const MAX_SUGGESTIONS: usize = 6;

/// Suggested next prompts for a conversation that already has an upstream session
#[instrument(skip(ctx))]
pub async fn suggest_prompts(
    ctx: &RelayContext,
    user_id: &str,
    conversation_id: &str,
) -> RelayResult<Vec<String>> {
    let mut conversations = ctx.store.conversations().await?;
    let index = find_owned(&conversations, user_id, conversation_id)?;

    let conv = &conversations[index];
    let upstream_id = conv
        .agent_conversation_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            RelayError::invalid_input_field(
                "conversation has no upstream session yet",
                "conversation_id",
            )
        })?;
    let request = SuggestRequest {
        conversation_id: upstream_id,
        log_id: conv
            .agent_last_history_id
            .clone()
            .filter(|id| !id.trim().is_empty()),
    };

    let registry = AgentRegistry::load(&ctx.config).await?;
    let token = ctx.token(registry.credentials()).await?;
    let raw = ctx.api.suggest_prompts(&token, &request).await?;

    let prompts: Vec<String> = raw
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| decode_escaped_text(p))
        .take(MAX_SUGGESTIONS)
        .collect();
    debug!(received = raw.len(), kept = prompts.len(), "prompt suggestions");

    conversations[index].updated_at = now_millis();
    ctx.store.save_conversations(&conversations).await?;

    Ok(prompts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentProfile, RelayConfig};
    use crate::store::{ConversationRecord, MemoryStore, RecordStore};
    use crate::upstream::ScriptedAgentApi;
    use std::sync::Arc;

    fn config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.upstream.api_key = Some("key".into());
        config.upstream.api_secret = Some("secret".into());
        config.agents = vec![AgentProfile::new("a1", "腹痛患者")];
        config
    }

    fn conversation(upstream: Option<&str>) -> ConversationRecord {
        let mut conv = ConversationRecord::new("u1", "问诊", 1_000);
        conv.id = "c1".into();
        conv.agent_conversation_id = upstream.map(str::to_string);
        conv.agent_last_history_id = upstream.map(|_| "h9".to_string());
        conv
    }

    fn context(api: Arc<ScriptedAgentApi>, conv: ConversationRecord) -> (RelayContext, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::with_conversations(vec![conv]));
        (RelayContext::new(config(), api, store.clone()), store)
    }

    #[tokio::test]
    async fn test_suggestions_are_cleaned_and_capped() {
        let api = Arc::new(ScriptedAgentApi::new().with_suggestions([
            "疼痛持续多久了？",
            "  ",
            "有没有发热\\n或呕吐？",
            "q3",
            "q4",
            "q5",
            "q6",
            "q7",
        ]));
        let (ctx, store) = context(api.clone(), conversation(Some("up-1")));

        let prompts = suggest_prompts(&ctx, "u1", "c1").await.unwrap();

        assert_eq!(prompts.len(), MAX_SUGGESTIONS);
        assert_eq!(prompts[0], "疼痛持续多久了？");
        assert_eq!(prompts[1], "有没有发热\n或呕吐？");
        assert_eq!(prompts[5], "q6");

        let requests = api.suggest_requests();
        assert_eq!(requests[0].conversation_id, "up-1");
        assert_eq!(requests[0].log_id.as_deref(), Some("h9"));

        let conv = store.conversations().await.unwrap().remove(0);
        assert!(conv.updated_at > 1_000);
    }

    #[tokio::test]
    async fn test_requires_upstream_session() {
        let api = Arc::new(ScriptedAgentApi::new());
        let (ctx, store) = context(api.clone(), conversation(None));

        let err = suggest_prompts(&ctx, "u1", "c1").await.unwrap_err();

        assert!(matches!(err, RelayError::InvalidInput { .. }));
        assert_eq!(api.token_calls(), 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_conversation() {
        let api = Arc::new(ScriptedAgentApi::new());
        let (ctx, _) = context(api, conversation(Some("up-1")));

        let err = suggest_prompts(&ctx, "u2", "c1").await.unwrap_err();
        assert!(matches!(err, RelayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_returned() {
        let api = Arc::new(
            ScriptedAgentApi::new().with_suggest_error(RelayError::upstream_http("获取推荐对话失败")),
        );
        let (ctx, store) = context(api, conversation(Some("up-1")));

        let err = suggest_prompts(&ctx, "u1", "c1").await.unwrap_err();
        assert!(matches!(err, RelayError::UpstreamHttp { .. }));
        assert_eq!(store.save_count(), 0);
    }
}
