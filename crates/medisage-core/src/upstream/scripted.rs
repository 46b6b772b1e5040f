//! Scripted upstream for tests
//!
//! Replays queued stream bodies instead of talking to the network and records
//! every request it receives.

use super::{AgentApi, ByteStream, StreamRequest, SuggestRequest};
use crate::auth::{ApiCredentials, TokenGrant, TokenSource};
use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use futures::Stream;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How one `open_stream` call is answered
#[derive(Debug, Clone)]
pub enum StreamScript {
    /// Send the chunks, then close the connection
    Chunks(Vec<Vec<u8>>),
    /// Send the chunks, then fail with a transport error
    Broken(Vec<Vec<u8>>, String),
    /// Send the chunks, then keep the connection open forever
    Hanging(Vec<Vec<u8>>),
    /// Reject the request with this HTTP status
    Status(u16),
}

impl StreamScript {
    /// One chunk per JSON payload, each framed as `data: ...\n\n`
    pub fn frames<I, S>(payloads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::Chunks(payloads.into_iter().map(|p| sse_frame(p.as_ref())).collect())
    }

    fn into_stream(self) -> RelayResult<ByteStream> {
        match self {
            Self::Chunks(chunks) => Ok(Box::pin(replay(chunks))),
            Self::Broken(chunks, message) => {
                let failure = stream::once(async move { Err(RelayError::upstream_http(message)) });
                Ok(Box::pin(replay(chunks).chain(failure)))
            }
            Self::Hanging(chunks) => Ok(Box::pin(replay(chunks).chain(stream::pending()))),
            Self::Status(code) => Err(RelayError::upstream_status(
                format!("status {}", code),
                code,
            )),
        }
    }
}

fn replay(chunks: Vec<Vec<u8>>) -> impl Stream<Item = RelayResult<Vec<u8>>> + Send + 'static {
    stream::iter(chunks.into_iter().map(Ok))
}

/// Frame one payload the way the upstream does
pub fn sse_frame(payload: &str) -> Vec<u8> {
    format!("data: {}\n\n", payload).into_bytes()
}

/// In-process [`AgentApi`] replaying queued scripts
#[derive(Debug)]
pub struct ScriptedAgentApi {
    token: Mutex<RelayResult<TokenGrant>>,
    streams: Mutex<VecDeque<StreamScript>>,
    suggestions: Mutex<RelayResult<Vec<String>>>,
    token_calls: AtomicUsize,
    stream_requests: Mutex<Vec<StreamRequest>>,
    suggest_requests: Mutex<Vec<SuggestRequest>>,
}

impl Default for ScriptedAgentApi {
    fn default() -> Self {
        Self {
            token: Mutex::new(Ok(TokenGrant {
                access_token: "scripted-token".to_string(),
                expires_in: Some(3600),
            })),
            streams: Mutex::new(VecDeque::new()),
            suggestions: Mutex::new(Ok(Vec::new())),
            token_calls: AtomicUsize::new(0),
            stream_requests: Mutex::new(Vec::new()),
            suggest_requests: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedAgentApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer of the next `open_stream` call
    pub fn with_stream(self, script: StreamScript) -> Self {
        self.streams.lock().push_back(script);
        self
    }

    pub fn with_token_error(self, error: RelayError) -> Self {
        *self.token.lock() = Err(error);
        self
    }

    pub fn with_suggestions<I, S>(self, list: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.suggestions.lock() = Ok(list.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_suggest_error(self, error: RelayError) -> Self {
        *self.suggestions.lock() = Err(error);
        self
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn stream_requests(&self) -> Vec<StreamRequest> {
        self.stream_requests.lock().clone()
    }

    pub fn suggest_requests(&self) -> Vec<SuggestRequest> {
        self.suggest_requests.lock().clone()
    }
}

#[async_trait]
impl TokenSource for ScriptedAgentApi {
    async fn fetch_token(&self, _credentials: &ApiCredentials) -> RelayResult<TokenGrant> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.token.lock().clone()
    }
}

#[async_trait]
impl AgentApi for ScriptedAgentApi {
    async fn open_stream(&self, _token: &str, request: &StreamRequest) -> RelayResult<ByteStream> {
        self.stream_requests.lock().push(request.clone());
        let script = self.streams.lock().pop_front();
        script
            .ok_or_else(|| RelayError::upstream_http("no scripted stream left"))?
            .into_stream()
    }

    async fn suggest_prompts(
        &self,
        _token: &str,
        request: &SuggestRequest,
    ) -> RelayResult<Vec<String>> {
        self.suggest_requests.lock().push(request.clone());
        self.suggestions.lock().clone()
    }
}
