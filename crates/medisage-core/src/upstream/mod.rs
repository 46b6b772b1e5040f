//! Upstream assistant API surface
//!
//! [`AgentApi`] is the seam between sessions and the HTTP client so that
//! sessions can be driven by scripted upstreams in tests (the `testing`
//! feature exposes [`ScriptedAgentApi`] to integration tests).

mod error_utils;
mod qingyan;
#[cfg(any(test, feature = "testing"))]
mod scripted;

pub use error_utils::sanitize_provider_error_text;
pub use qingyan::QingyanClient;
#[cfg(any(test, feature = "testing"))]
pub use scripted::{ScriptedAgentApi, StreamScript, sse_frame};

use crate::auth::TokenSource;
use crate::error::RelayResult;
use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;
use std::pin::Pin;

/// Raw body chunks of a streamed reply
pub type ByteStream = Pin<Box<dyn Stream<Item = RelayResult<Vec<u8>>> + Send>>;

/// Body of a streaming request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamRequest {
    pub assistant_id: String,
    /// Upstream session to continue; a new one is opened when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub prompt: String,
}

/// Body of a prompt suggestion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestRequest {
    pub conversation_id: String,
    /// Upstream turn the suggestions should follow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_id: Option<String>,
}

/// Assistant API endpoints used by the relay.
///
/// Token acquisition comes from the [`TokenSource`] supertrait.
#[async_trait]
pub trait AgentApi: TokenSource {
    /// Open a streamed reply; non-2xx answers fail with `UpstreamHttp`
    async fn open_stream(&self, token: &str, request: &StreamRequest) -> RelayResult<ByteStream>;

    /// Raw suggestion list of an upstream session
    async fn suggest_prompts(&self, token: &str, request: &SuggestRequest)
    -> RelayResult<Vec<String>>;
}
