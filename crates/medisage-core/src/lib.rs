//! MediSage Core Library
//!
//! Streaming relay between a hosted assistant API and a chat client, used to
//! train clinical interviewing against simulated patients. The crate covers
//! token caching, upstream frame parsing, delta reconciliation, session
//! persistence and the scoring of finished consultations.

pub mod auth;
pub mod config;
pub mod conversations;
pub mod error;
pub mod relay;
pub mod scoring;
pub mod sse;
pub mod store;
pub mod suggest;
pub mod upstream;

// Re-export commonly used types
pub use auth::{ApiCredentials, TokenCache, TokenSource};
pub use config::{AgentProfile, AgentRegistry, RelayConfig, load_config};
pub use conversations::ConversationService;
pub use error::{RelayError, RelayResult, UnifiedError};
pub use relay::{
    ChatRequest, DownstreamEvent, DownstreamFrame, RelayContext, ScoreRequest, SessionOutcome,
    StreamSession,
};
pub use scoring::{ScoreSummary, ScoreTable};
pub use sse::FrameParser;
pub use store::{JsonFileStore, MemoryStore, RecordStore};
pub use suggest::suggest_prompts;
pub use upstream::{AgentApi, QingyanClient};
