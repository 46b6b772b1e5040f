//! Core error types and traits

use thiserror::Error;

/// Result type alias for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Unified error trait implemented by [`RelayError`].
///
/// - error_code(): Unique code for programmatic error identification
/// - message(): Human-readable error message
/// - context(): Optional additional context
pub trait UnifiedError: std::error::Error + Send + Sync {
    /// Get the error code for programmatic handling
    fn error_code(&self) -> &str;

    /// Get the human-readable error message
    fn message(&self) -> &str;

    /// Get optional context about the error
    fn context(&self) -> Option<&str> {
        None
    }

    /// Check if this error is retryable
    fn is_retryable(&self) -> bool {
        false
    }
}

/// Main error type for the relay
#[derive(Error, Debug, Clone)]
pub enum RelayError {
    /// Missing or invalid configuration (credentials, agent list, config file)
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        context: Option<String>,
    },

    /// Bearer token acquisition failed
    #[error("Authorization failed: {message}")]
    Auth {
        message: String,
        context: Option<String>,
    },

    /// Upstream answered with a non-2xx status or without a body
    #[error("Upstream HTTP error: {message}")]
    UpstreamHttp {
        message: String,
        status_code: Option<u16>,
        context: Option<String>,
    },

    /// Upstream reported an error inside the event stream
    #[error("Upstream error: {message}")]
    UpstreamProtocol {
        message: String,
        code: Option<String>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        context: Option<String>,
    },

    /// IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        context: Option<String>,
    },

    /// Record store errors
    #[error("Storage error: {message}")]
    Storage {
        message: String,
        context: Option<String>,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        message: String,
        resource_type: Option<String>,
    },

    /// Invalid request input
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        field: Option<String>,
    },

    /// The client went away or the session was interrupted
    #[error("Session was cancelled")]
    Cancelled,
}
