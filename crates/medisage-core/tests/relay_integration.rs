//! Integration tests for MediSage relay sessions
//!
//! Drives whole consultations (create, chat, score, suggest) against a
//! scripted upstream and the JSON file store in a temporary data directory.

use futures::StreamExt;
use medisage_core::config::AgentProfile;
use medisage_core::relay::{FinishReason, SessionPhase, decode_frames};
use medisage_core::store::{MessageRole, ScoreMode};
use medisage_core::upstream::{ScriptedAgentApi, StreamScript, sse_frame};
use medisage_core::{
    ChatRequest, ConversationService, DownstreamEvent, DownstreamFrame, JsonFileStore,
    RecordStore, RelayConfig, RelayContext, ScoreRequest, StreamSession, suggest_prompts,
};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const REPORT: &str = "| 评分项目 | 得分 | 扣分原因 | 改进建议 |\n\
                      |:---|:---:|---|---|\n\
                      | 病史采集（40分） | 32 | 未询问既往史 | 系统回顾既往史 |\n\
                      | 沟通技巧（60分） | 48 | 打断患者 | 耐心倾听 |\n\
                      | 总计 | 80 |  |  |";

fn config(data_dir: &Path) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.upstream.api_key = Some("key".into());
    config.upstream.api_secret = Some("secret".into());
    config.storage.data_dir = data_dir.to_path_buf();
    config.agents = vec![
        AgentProfile::new("a1", "腹痛患者"),
        AgentProfile::new("a2", "发热患者"),
    ];
    config
}

fn running(conversation_id: &str, history_id: &str, text: &str) -> String {
    json!({"result": {
        "status": "running",
        "conversation_id": conversation_id,
        "history_id": history_id,
        "message": {"content": {"type": "text", "text": text}}
    }})
    .to_string()
}

fn finish() -> String {
    json!({"result": {"status": "finish"}}).to_string()
}

struct Fixture {
    _dir: TempDir,
    ctx: RelayContext,
    api: Arc<ScriptedAgentApi>,
    service: ConversationService,
}

impl Fixture {
    fn new(api: ScriptedAgentApi) -> Self {
        let dir = TempDir::new().unwrap();
        let config = config(dir.path());
        let api = Arc::new(api);
        let store = Arc::new(JsonFileStore::new(dir.path()));
        let ctx = RelayContext::new(config, api.clone(), store.clone());
        let service = ConversationService::new(ctx.config.clone(), store);
        Self {
            _dir: dir,
            ctx,
            api,
            service,
        }
    }

    /// A fresh store over the same directory, to observe what reached disk
    fn reopened_store(&self) -> JsonFileStore {
        JsonFileStore::new(self.ctx.config.storage.data_dir.clone())
    }

    async fn chat(&self, conversation_id: &str, message: &str) -> Vec<DownstreamFrame> {
        let request = ChatRequest::new("u1", conversation_id, message);
        let session = StreamSession::open_chat(self.ctx.clone(), request)
            .await
            .unwrap();
        session.spawn(CancellationToken::new()).collect().await
    }
}

fn deltas(frames: &[DownstreamFrame]) -> String {
    frames
        .iter()
        .filter_map(|f| match f {
            DownstreamFrame::Event(DownstreamEvent::Delta { delta }) => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_consultation_chat_then_score() {
    let fixture = Fixture::new(
        ScriptedAgentApi::new()
            .with_stream(StreamScript::frames([
                running("up-1", "h-1", "医生"),
                running("up-1", "h-1", "医生，我肚子疼"),
                finish(),
            ]))
            .with_stream(StreamScript::frames([
                running("up-1", "h-2", "从昨天"),
                running("up-1", "h-2", "从昨天晚上开始"),
                finish(),
            ]))
            .with_stream(StreamScript::frames([
                running("up-1", "h-3", REPORT),
                finish(),
            ])),
    );
    let conv = fixture
        .service
        .create_conversation("u1", None, Some("腹痛患者"))
        .await
        .unwrap();
    assert_eq!(conv.title, "腹痛患者");

    let first = fixture.chat(&conv.id, "哪里不舒服？").await;
    assert_eq!(deltas(&first), "医生，我肚子疼");
    assert_eq!(first.last(), Some(&DownstreamFrame::End));

    let second = fixture.chat(&conv.id, "什么时候开始的？").await;
    assert_eq!(deltas(&second), "从昨天晚上开始");

    let requests = fixture.api.stream_requests();
    assert_eq!(requests[0].conversation_id, None);
    assert_eq!(requests[1].conversation_id.as_deref(), Some("up-1"));

    let stored = fixture.reopened_store().conversations().await.unwrap();
    assert_eq!(stored.len(), 1);
    let texts: Vec<(MessageRole, &str)> = stored[0]
        .messages
        .iter()
        .map(|m| (m.role, m.text.as_str()))
        .collect();
    assert_eq!(
        texts,
        vec![
            (MessageRole::User, "哪里不舒服？"),
            (MessageRole::Ai, "医生，我肚子疼"),
            (MessageRole::User, "什么时候开始的？"),
            (MessageRole::Ai, "从昨天晚上开始"),
        ]
    );
    assert_eq!(stored[0].agent_last_history_id.as_deref(), Some("h-2"));

    let session = StreamSession::open_score(fixture.ctx.clone(), ScoreRequest::new("u1", &conv.id))
        .await
        .unwrap();
    let score_id = session.score_id().unwrap().to_string();
    let frames: Vec<DownstreamFrame> = session.spawn(CancellationToken::new()).collect().await;
    assert_eq!(frames.last(), Some(&DownstreamFrame::End));

    let scores = fixture.service.list_scores("u1").await.unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].id, score_id);
    assert_eq!(scores[0].total_score, Some(80.0));

    let sessions = fixture.service.list_agent_sessions("u1").await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].agent_name.as_deref(), Some("腹痛患者"));
}

#[tokio::test]
async fn test_score_report_reaches_disk() {
    let fixture = Fixture::new(
        ScriptedAgentApi::new().with_stream(StreamScript::frames([running("up-9", "h-1", REPORT), finish()])),
    );
    let conv = fixture.service.create_conversation("u1", None, None).await.unwrap();

    let session = StreamSession::open_score(fixture.ctx.clone(), ScoreRequest::new("u1", &conv.id))
        .await
        .unwrap();
    let score_id = session.score_id().unwrap().to_string();
    let frames: Vec<DownstreamFrame> = session.spawn(CancellationToken::new()).collect().await;

    assert_eq!(deltas(&frames), REPORT);
    assert_eq!(frames.last(), Some(&DownstreamFrame::End));

    let record = fixture.service.get_score("u1", &score_id).await.unwrap();
    assert_eq!(record.mode, ScoreMode::AgentTable);
    assert_eq!(record.total_score, Some(80.0));
    assert_eq!(record.table.headers.len(), 4);
    assert_eq!(record.items.len(), 3);
    assert_eq!(record.items[0].max_points, Some(40.0));

    let reopened = fixture.reopened_store().scores().await.unwrap();
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened[0].report_markdown, REPORT);

    // Scoring never appends messages but still tracks the upstream session.
    let conv = fixture.reopened_store().conversations().await.unwrap().remove(0);
    assert!(conv.messages.is_empty());
    assert_eq!(conv.agent_conversation_id.as_deref(), Some("up-9"));
}

#[tokio::test]
async fn test_disconnect_without_finish_keeps_partial_reply() {
    // The last frame is cut off before its blank-line terminator.
    let mut chunks = vec![sse_frame(&running("up-1", "h-1", "肚子"))];
    chunks.push(format!("data: {}", running("up-1", "h-1", "肚子很疼")).into_bytes());
    let fixture = Fixture::new(ScriptedAgentApi::new().with_stream(StreamScript::Chunks(chunks)));
    let conv = fixture.service.create_conversation("u1", None, None).await.unwrap();

    let request = ChatRequest::new("u1", &conv.id, "哪里疼？");
    let session = StreamSession::open_chat(fixture.ctx.clone(), request)
        .await
        .unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::channel(64);
    let outcome = session.run(tx, CancellationToken::new()).await;
    let mut frames = Vec::new();
    while let Some(frame) = rx.recv().await {
        frames.push(frame);
    }

    assert_eq!(
        outcome.phase,
        SessionPhase::Finished {
            reason: FinishReason::Disconnected
        }
    );
    assert_eq!(deltas(&frames), "肚子很疼");
    assert!(frames.iter().any(|f| matches!(
        f,
        DownstreamFrame::Event(DownstreamEvent::Done(_))
    )));

    let stored = fixture.reopened_store().conversations().await.unwrap();
    assert_eq!(stored[0].messages[1].text, "肚子很疼");
}

#[tokio::test]
async fn test_encoded_stream_decodes_to_same_frames() {
    let fixture = Fixture::new(ScriptedAgentApi::new().with_stream(StreamScript::frames([
        running("up-1", "h-1", "第一行\\n第二行"),
        finish(),
    ])));
    let conv = fixture.service.create_conversation("u1", None, None).await.unwrap();

    let frames = fixture.chat(&conv.id, "请描述症状").await;
    let wire: String = frames.iter().map(DownstreamFrame::encode).collect();

    assert!(wire.ends_with("data: [DONE]\n\n"));
    assert_eq!(deltas(&frames), "第一行\n第二行");
    assert_eq!(decode_frames(&wire), frames);
}

#[tokio::test]
async fn test_suggestions_follow_latest_turn() {
    let fixture = Fixture::new(
        ScriptedAgentApi::new()
            .with_stream(StreamScript::frames([running("up-7", "h-7", "嗯"), finish()]))
            .with_suggestions(["还有其他症状吗？", "既往有什么病史？"]),
    );
    let conv = fixture.service.create_conversation("u1", None, None).await.unwrap();
    fixture.chat(&conv.id, "您好").await;

    let prompts = suggest_prompts(&fixture.ctx, "u1", &conv.id).await.unwrap();

    assert_eq!(prompts, vec!["还有其他症状吗？", "既往有什么病史？"]);
    let request = &fixture.api.suggest_requests()[0];
    assert_eq!(request.conversation_id, "up-7");
    assert_eq!(request.log_id.as_deref(), Some("h-7"));
    assert_eq!(fixture.api.token_calls(), 1);
}

#[tokio::test]
async fn test_delete_removes_everything_on_disk() {
    let fixture = Fixture::new(
        ScriptedAgentApi::new().with_stream(StreamScript::frames([running("up-1", "h-1", REPORT), finish()])),
    );
    let conv = fixture.service.create_conversation("u1", None, None).await.unwrap();
    let session = StreamSession::open_score(fixture.ctx.clone(), ScoreRequest::new("u1", &conv.id))
        .await
        .unwrap();
    let _: Vec<DownstreamFrame> = session.spawn(CancellationToken::new()).collect().await;

    fixture.service.delete_conversation("u1", &conv.id).await.unwrap();

    let store = fixture.reopened_store();
    assert!(store.conversations().await.unwrap().is_empty());
    assert!(store.agent_sessions().await.unwrap().is_empty());
    assert!(store.scores().await.unwrap().is_empty());
}
