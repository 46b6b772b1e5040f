//! One relay request
//!
//! A [`StreamSession`] is opened against a stored conversation and then run as
//! a single task: it reads the upstream reply, emits normalized downstream
//! frames, keeps the upstream correlation ids of the conversation current and
//! persists the outcome. Chat sessions store the reply on the conversation;
//! scoring sessions turn the reply into a [`ScoreRecord`].

use super::context::RelayContext;
use super::downstream::{DownstreamEvent, DownstreamFrame};
use super::reconciler::DeltaReconciler;
use super::state::{FinishReason, SessionPhase, Transition};
use crate::auth::ApiCredentials;
use crate::config::{AgentProfile, AgentRegistry};
use crate::error::{RelayError, RelayResult};
use crate::scoring;
use crate::sse::{FrameParser, RawEvent, UpstreamEvent};
use crate::store::{
    ChatMessage, ConversationRecord, ScoreMode, ScoreRecord, find_owned, now_millis,
    upsert_agent_session,
};
use crate::upstream::StreamRequest;
use futures::StreamExt;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Prompt sent for a greeting turn without user text
pub const GREETING_PROMPT: &str = "你好";

const DOWNSTREAM_BUFFER: usize = 64;

/// One chat turn
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatRequest {
    pub user_id: String,
    pub conversation_id: String,
    pub message: String,
    /// Ask the agent for its opening line; no user message is recorded
    pub init: bool,
    pub agent_name: Option<String>,
    /// Talk to this assistant regardless of the conversation's agent
    pub assistant_id: Option<String>,
    /// Continue this upstream session instead of the stored one
    pub upstream_conversation_id: Option<String>,
}

impl ChatRequest {
    pub fn new(
        user_id: impl Into<String>,
        conversation_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn greeting(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            init: true,
            ..Self::new(user_id, conversation_id, "")
        }
    }

    fn prompt(&self) -> RelayResult<String> {
        if !self.message.trim().is_empty() {
            return Ok(self.message.clone());
        }
        if self.init {
            return Ok(GREETING_PROMPT.to_string());
        }
        Err(RelayError::invalid_input_field("message is empty", "message"))
    }
}

/// Grade one conversation
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRequest {
    pub user_id: String,
    pub conversation_id: String,
}

impl ScoreRequest {
    pub fn new(user_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub phase: SessionPhase,
    /// Concatenation of every emitted delta
    pub text: String,
    /// The consumer went away or the session was cancelled
    pub cancelled: bool,
    /// Mode of the persisted score record (scoring sessions)
    pub score_mode: Option<ScoreMode>,
}

/// A prepared relay session
pub struct StreamSession {
    state: SessionState,
    turn: Turn,
}

enum Turn {
    Chat(ChatTurn),
    Score(ScoreTurn),
}

struct ChatTurn {
    agent: AgentProfile,
    credentials: ApiCredentials,
    prompt: String,
    reply_id: String,
}

struct ScoreTurn {
    score_id: String,
    user_id: String,
}

impl StreamSession {
    /// Validate a chat turn and record it on the conversation.
    ///
    /// The user message (unless `init`) and an empty reply are appended and
    /// saved before anything is streamed.
    pub async fn open_chat(ctx: RelayContext, request: ChatRequest) -> RelayResult<Self> {
        let prompt = request.prompt()?;
        let mut conversations = ctx.store.conversations().await?;
        let index = find_owned(&conversations, &request.user_id, &request.conversation_id)?;
        let registry = AgentRegistry::load(&ctx.config).await?;

        let conv = &conversations[index];
        let agent = registry.resolve(
            request.assistant_id.as_deref(),
            conv.agent_id.as_deref(),
            conv.agent_name.as_deref(),
            request.agent_name.as_deref(),
        );

        let now = now_millis();
        let reply = ChatMessage::pending_reply(&agent.id, &agent.name, request.init, now);
        let reply_id = reply.id.clone();

        let conv = &mut conversations[index];
        if let Some(upstream) = request
            .upstream_conversation_id
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            conv.agent_conversation_id = Some(upstream.to_string());
        }
        if !request.init {
            conv.messages.push(ChatMessage::user(request.message.clone(), now));
        }
        conv.messages.push(reply);
        conv.agent_id = Some(agent.id.clone());
        conv.agent_name = Some(agent.name.clone());
        conv.updated_at = now;

        ctx.store.save_conversations(&conversations).await?;
        upsert_agent_session(ctx.store.as_ref(), &conversations[index], now).await?;

        info!(
            conversation_id = %request.conversation_id,
            agent_id = %agent.id,
            init = request.init,
            "chat session opened"
        );

        Ok(Self {
            state: SessionState::new(ctx, conversations, index, Some(reply_id.clone())),
            turn: Turn::Chat(ChatTurn {
                agent,
                credentials: registry.credentials().clone(),
                prompt,
                reply_id,
            }),
        })
    }

    /// Validate a scoring request; nothing is written until the session runs
    pub async fn open_score(ctx: RelayContext, request: ScoreRequest) -> RelayResult<Self> {
        let conversations = ctx.store.conversations().await?;
        let index = find_owned(&conversations, &request.user_id, &request.conversation_id)?;
        let score_id = crate::store::new_id();

        info!(conversation_id = %request.conversation_id, %score_id, "scoring session opened");

        Ok(Self {
            state: SessionState::new(ctx, conversations, index, None),
            turn: Turn::Score(ScoreTurn {
                score_id,
                user_id: request.user_id,
            }),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.state.conversation().id
    }

    /// Id of the assistant message this chat session fills
    pub fn reply_id(&self) -> Option<&str> {
        match &self.turn {
            Turn::Chat(turn) => Some(&turn.reply_id),
            Turn::Score(_) => None,
        }
    }

    /// Id of the score record this scoring session writes
    pub fn score_id(&self) -> Option<&str> {
        match &self.turn {
            Turn::Chat(_) => None,
            Turn::Score(turn) => Some(&turn.score_id),
        }
    }

    /// Run the session on a new task and return its downstream frames
    pub fn spawn(self, cancel: CancellationToken) -> ReceiverStream<DownstreamFrame> {
        let (tx, rx) = mpsc::channel(DOWNSTREAM_BUFFER);
        tokio::spawn(self.run(tx, cancel));
        ReceiverStream::new(rx)
    }

    /// Drive the session to completion, writing frames to `sink`.
    ///
    /// Stops without further writes once `cancel` fires or `sink` is closed.
    #[instrument(skip_all, fields(conversation_id = %self.conversation_id()))]
    pub async fn run(
        self,
        sink: mpsc::Sender<DownstreamFrame>,
        cancel: CancellationToken,
    ) -> SessionOutcome {
        let out = Downstream { sink, cancel };
        let Self { mut state, turn } = self;
        match turn {
            Turn::Chat(turn) => state.run_chat(turn, &out).await,
            Turn::Score(turn) => state.run_score(turn, &out).await,
        }
        state.into_outcome()
    }
}

/// Downstream sink bound to the session's cancellation
struct Downstream {
    sink: mpsc::Sender<DownstreamFrame>,
    cancel: CancellationToken,
}

impl Downstream {
    /// Await `fut` unless the session is cancelled first
    async fn guard<F: Future>(&self, fut: F) -> RelayResult<F::Output> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RelayError::Cancelled),
            _ = self.sink.closed() => Err(RelayError::Cancelled),
            output = fut => Ok(output),
        }
    }

    async fn emit(&self, event: DownstreamEvent) -> RelayResult<()> {
        if self.cancel.is_cancelled() {
            return Err(RelayError::Cancelled);
        }
        self.guard(self.sink.send(event.into()))
            .await?
            .map_err(|_| RelayError::Cancelled)
    }

    async fn end(&self) {
        if !self.cancel.is_cancelled() {
            let _ = self.sink.send(DownstreamFrame::End).await;
        }
    }
}

/// Mutable per-request state
struct SessionState {
    ctx: RelayContext,
    conversations: Vec<ConversationRecord>,
    index: usize,
    /// Assistant message filled by a chat session
    reply_id: Option<String>,
    reconciler: DeltaReconciler,
    phase: SessionPhase,
    /// The upstream accepted the request
    streaming: bool,
    cancelled: bool,
    score_mode: Option<ScoreMode>,
}

impl SessionState {
    fn new(
        ctx: RelayContext,
        conversations: Vec<ConversationRecord>,
        index: usize,
        reply_id: Option<String>,
    ) -> Self {
        Self {
            ctx,
            conversations,
            index,
            reply_id,
            reconciler: DeltaReconciler::new(),
            phase: SessionPhase::default(),
            streaming: false,
            cancelled: false,
            score_mode: None,
        }
    }

    fn conversation(&self) -> &ConversationRecord {
        &self.conversations[self.index]
    }

    fn conversation_mut(&mut self) -> &mut ConversationRecord {
        &mut self.conversations[self.index]
    }

    async fn save_conversations(&self) -> RelayResult<()> {
        self.ctx.store.save_conversations(&self.conversations).await
    }

    fn into_outcome(self) -> SessionOutcome {
        SessionOutcome {
            phase: self.phase,
            text: self.reconciler.into_text(),
            cancelled: self.cancelled,
            score_mode: self.score_mode,
        }
    }

    fn mark_cancelled(&mut self) {
        info!(
            chars = self.reconciler.accumulated_text().chars().count(),
            "session cancelled by the consumer"
        );
        self.cancelled = true;
        self.phase.fail(RelayError::Cancelled.client_message());
    }

    /// Stream one upstream reply into `out` until a terminal signal.
    async fn relay(
        &mut self,
        credentials: &ApiCredentials,
        request: StreamRequest,
        out: &Downstream,
    ) -> RelayResult<FinishReason> {
        let token = out.guard(self.ctx.token(credentials)).await??;
        let mut body = out.guard(self.ctx.api.open_stream(&token, &request)).await??;
        self.streaming = true;
        debug!(assistant_id = %request.assistant_id, "upstream stream open");

        let mut parser = FrameParser::new();
        loop {
            let events = match out.guard(body.next()).await? {
                Some(chunk) => parser.feed(&chunk?),
                None => {
                    for event in parser.finish() {
                        if let Some(reason) = self.apply(event, out).await? {
                            return Ok(reason);
                        }
                    }
                    warn!("upstream closed without a completion status");
                    return Ok(match self.phase.on_disconnect() {
                        Transition::Finish(reason) => reason,
                        _ => FinishReason::Disconnected,
                    });
                }
            };
            for event in events {
                if let Some(reason) = self.apply(event, out).await? {
                    return Ok(reason);
                }
            }
        }
    }

    /// Apply one upstream event; returns the finish reason when it ends the reply
    async fn apply(
        &mut self,
        event: UpstreamEvent,
        out: &Downstream,
    ) -> RelayResult<Option<FinishReason>> {
        let transition = self.phase.on_event(&event);
        let raw = match event {
            UpstreamEvent::Terminal => {
                return Ok(match transition {
                    Transition::Finish(reason) => Some(reason),
                    _ => None,
                });
            }
            UpstreamEvent::Record(raw) => raw,
        };
        if transition == Transition::Ignore {
            return Ok(None);
        }

        self.sync_correlation_ids(&raw, out).await?;

        if let Transition::Fail(message) = transition {
            error!(code = ?raw.error_code, "upstream reported an error: {}", message);
            return Err(RelayError::upstream_protocol(message, raw.error_code));
        }

        if let Some(text) = raw.message_text.as_deref() {
            if let Some(delta) = self.reconciler.reconcile(text) {
                self.sync_reply_text();
                out.emit(DownstreamEvent::delta(delta)).await?;
            }
        }

        Ok(match transition {
            Transition::Finish(reason) => Some(reason),
            _ => None,
        })
    }

    /// Persist upstream ids that differ from the stored ones
    async fn sync_correlation_ids(&mut self, raw: &RawEvent, out: &Downstream) -> RelayResult<()> {
        if let Some(upstream_id) = raw.conversation_id.as_deref() {
            if self.conversation().agent_conversation_id.as_deref() != Some(upstream_id) {
                let now = now_millis();
                let conv = self.conversation_mut();
                conv.agent_conversation_id = Some(upstream_id.to_string());
                conv.updated_at = now;
                self.save_conversations().await?;
                upsert_agent_session(self.ctx.store.as_ref(), self.conversation(), now).await?;
                info!(upstream_conversation_id = upstream_id, "upstream session assigned");
                out.emit(DownstreamEvent::upstream_conversation(upstream_id))
                    .await?;
            }
        }

        if let Some(history_id) = raw.history_id.as_deref() {
            if self.conversation().agent_last_history_id.as_deref() != Some(history_id) {
                let conv = self.conversation_mut();
                conv.agent_last_history_id = Some(history_id.to_string());
                conv.updated_at = now_millis();
                self.save_conversations().await?;
                debug!(history_id, "upstream turn id updated");
            }
        }
        Ok(())
    }

    /// Mirror the accumulated text into the in-progress reply message
    fn sync_reply_text(&mut self) {
        let Some(reply_id) = self.reply_id.clone() else {
            return;
        };
        let text = self.reconciler.accumulated_text().to_string();
        if let Some(reply) = self.conversation_mut().message_mut(&reply_id) {
            reply.text = text;
        }
    }

    async fn persist_reply(&mut self) -> RelayResult<()> {
        self.sync_reply_text();
        self.conversation_mut().updated_at = now_millis();
        self.save_conversations().await
    }

    async fn run_chat(&mut self, turn: ChatTurn, out: &Downstream) {
        let result = match self.stream_chat(&turn, out).await {
            Ok(reason) => self.finish_chat(&turn, reason, out).await,
            Err(e) => Err(e),
        };
        let Err(e) = result else {
            return;
        };
        if matches!(e, RelayError::Cancelled) {
            self.mark_cancelled();
            return;
        }

        let message = e.client_message();
        self.phase.fail(message.clone());
        error!(error = %e, "chat session failed");
        if out.emit(DownstreamEvent::error(message)).await.is_err() {
            self.mark_cancelled();
            return;
        }
        if self.streaming {
            if let Err(e) = self.persist_reply().await {
                error!("failed to persist partial reply: {}", e);
            }
        }
        out.end().await;
    }

    async fn stream_chat(&mut self, turn: &ChatTurn, out: &Downstream) -> RelayResult<FinishReason> {
        out.emit(DownstreamEvent::agent(&turn.agent.id, &turn.agent.name))
            .await?;
        let request = StreamRequest {
            assistant_id: turn.agent.id.clone(),
            conversation_id: self.conversation().agent_conversation_id.clone(),
            prompt: turn.prompt.clone(),
        };
        self.relay(&turn.credentials, request, out).await
    }

    async fn finish_chat(
        &mut self,
        turn: &ChatTurn,
        reason: FinishReason,
        out: &Downstream,
    ) -> RelayResult<()> {
        self.persist_reply().await?;
        info!(
            %reason,
            chars = self.reconciler.accumulated_text().chars().count(),
            "chat reply finished"
        );
        let upstream_id = self.conversation().agent_conversation_id.clone();
        out.emit(DownstreamEvent::chat_done(upstream_id, turn.reply_id.as_str()))
            .await?;
        out.end().await;
        Ok(())
    }

    async fn run_score(&mut self, turn: ScoreTurn, out: &Downstream) {
        let conv_id = self.conversation().id.clone();
        if out
            .emit(DownstreamEvent::score_started(conv_id, turn.score_id.as_str()))
            .await
            .is_err()
        {
            self.mark_cancelled();
            return;
        }

        let registry = match AgentRegistry::load(&self.ctx.config).await {
            Ok(registry) => registry,
            Err(e) => {
                warn!("agent registry unavailable, scoring by keyword coverage: {}", e);
                self.phase.fail(e.client_message());
                self.finish_fallback(&turn, out).await;
                return;
            }
        };

        let result = match self.stream_score(&registry, out).await {
            Ok(reason) => self.finish_score(&turn, reason, out).await,
            Err(e) => Err(e),
        };
        let Err(e) = result else {
            return;
        };
        if matches!(e, RelayError::Cancelled) {
            self.mark_cancelled();
            return;
        }

        let message = e.client_message();
        self.phase.fail(message.clone());
        error!(error = %e, "scoring session failed, falling back to keyword coverage");
        if out.emit(DownstreamEvent::error(message)).await.is_err() {
            self.mark_cancelled();
            return;
        }
        self.finish_fallback(&turn, out).await;
    }

    async fn stream_score(
        &mut self,
        registry: &AgentRegistry,
        out: &Downstream,
    ) -> RelayResult<FinishReason> {
        let assistant_id = self
            .conversation()
            .agent_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| registry.pick(None).id.clone());
        let request = StreamRequest {
            assistant_id,
            conversation_id: self.conversation().agent_conversation_id.clone(),
            prompt: self.ctx.config.scoring.prompt(),
        };
        self.relay(registry.credentials(), request, out).await
    }

    async fn finish_score(
        &mut self,
        turn: &ScoreTurn,
        reason: FinishReason,
        out: &Downstream,
    ) -> RelayResult<()> {
        let report = self.reconciler.accumulated_text().to_string();
        let table = scoring::extract(&report);
        let summary = scoring::summarize(&table);
        if table.is_empty() {
            warn!("score report contains no table");
        }
        info!(
            %reason,
            total_score = ?summary.total_score,
            items = summary.items.len(),
            "score report finished"
        );

        let record = ScoreRecord {
            id: turn.score_id.clone(),
            user_id: turn.user_id.clone(),
            conversation_id: self.conversation().id.clone(),
            mode: ScoreMode::AgentTable,
            total_score: summary.total_score,
            report_markdown: report,
            items: summary.items,
            table,
            coverage: None,
            created_at: now_millis(),
        };
        self.append_score(record).await?;
        self.score_mode = Some(ScoreMode::AgentTable);

        out.emit(DownstreamEvent::score_done(
            turn.score_id.as_str(),
            ScoreMode::AgentTable,
        ))
        .await?;
        out.end().await;
        Ok(())
    }

    /// Persist a keyword-coverage score so the request never dead-ends
    async fn finish_fallback(&mut self, turn: &ScoreTurn, out: &Downstream) {
        let result = scoring::keyword_score(
            &self.conversation().transcript(),
            &self.ctx.config.scoring.keywords,
        );
        let record = ScoreRecord {
            id: turn.score_id.clone(),
            user_id: turn.user_id.clone(),
            conversation_id: self.conversation().id.clone(),
            mode: ScoreMode::Fallback,
            total_score: Some(result.score),
            report_markdown: String::new(),
            items: Vec::new(),
            table: scoring::ScoreTable::default(),
            coverage: Some(result.coverage),
            created_at: now_millis(),
        };

        if let Err(e) = self.append_score(record).await {
            error!("failed to persist fallback score: {}", e);
            out.end().await;
            return;
        }
        self.score_mode = Some(ScoreMode::Fallback);
        info!(
            score = result.score,
            covered = result.coverage.covered,
            "fallback score recorded"
        );

        if out
            .emit(DownstreamEvent::score_done(
                turn.score_id.as_str(),
                ScoreMode::Fallback,
            ))
            .await
            .is_err()
        {
            self.mark_cancelled();
            return;
        }
        out.end().await;
    }

    async fn append_score(&self, record: ScoreRecord) -> RelayResult<()> {
        let mut scores = self.ctx.store.scores().await?;
        scores.push(record);
        self.ctx.store.save_scores(&scores).await
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
