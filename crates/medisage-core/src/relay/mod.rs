//! Streaming relay engine
//!
//! - [`reconciler`]: snapshot-to-delta reconciliation
//! - [`state`]: finish/error state machine
//! - [`downstream`]: normalized events and their wire encoding
//! - [`session`]: chat and scoring sessions tying it all together

mod context;
pub mod downstream;
pub mod reconciler;
pub mod session;
pub mod state;

pub use context::RelayContext;
pub use downstream::{DoneInfo, DownstreamEvent, DownstreamFrame, MetaInfo, decode_frames};
pub use reconciler::DeltaReconciler;
pub use session::{ChatRequest, GREETING_PROMPT, ScoreRequest, SessionOutcome, StreamSession};
pub use state::{FinishReason, SessionPhase, Transition};
