//! Error types for the MediSage relay
//!
//! Every fallible operation in the core returns [`RelayResult`]. Errors carry a
//! stable code (see [`UnifiedError`]) so that the relay can turn any
//! session-fatal condition into a single normalized downstream error event.

mod constructors;
mod conversions;
mod types;
mod unified_error;

pub use types::{RelayError, RelayResult, UnifiedError};
