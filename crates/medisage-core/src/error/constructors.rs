//! Constructor methods for RelayError

use super::types::RelayError;

impl RelayError {
    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: None,
        }
    }

    /// Create a configuration error with context
    pub fn config_with_context(message: impl Into<String>, context: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            context: Some(context.into()),
        }
    }

    /// Create a new authorization error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            context: None,
        }
    }

    /// Create an upstream HTTP error without a status (transport failure, missing body)
    pub fn upstream_http(message: impl Into<String>) -> Self {
        Self::UpstreamHttp {
            message: message.into(),
            status_code: None,
            context: None,
        }
    }

    /// Create an upstream HTTP error with status code
    pub fn upstream_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::UpstreamHttp {
            message: message.into(),
            status_code: Some(status_code),
            context: None,
        }
    }

    /// Create an upstream protocol error from a stream-level error signal
    pub fn upstream_protocol(message: impl Into<String>, code: Option<String>) -> Self {
        Self::UpstreamProtocol {
            message: message.into(),
            code,
        }
    }

    /// Create a JSON error with message
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
            context: None,
        }
    }

    /// Create an IO error with message
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
            context: None,
        }
    }

    /// Create a new storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            context: None,
        }
    }

    /// Create a not found error with resource type
    pub fn not_found_resource(
        message: impl Into<String>,
        resource_type: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: Some(resource_type.into()),
        }
    }

    /// Create an invalid input error with field
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Add context to any error that carries it
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let ctx = Some(context.into());
        match &mut self {
            Self::Config { context: c, .. } => *c = ctx,
            Self::Auth { context: c, .. } => *c = ctx,
            Self::UpstreamHttp { context: c, .. } => *c = ctx,
            Self::Json { context: c, .. } => *c = ctx,
            Self::Io { context: c, .. } => *c = ctx,
            Self::Storage { context: c, .. } => *c = ctx,
            Self::UpstreamProtocol { .. }
            | Self::NotFound { .. }
            | Self::InvalidInput { .. }
            | Self::Cancelled => {}
        }
        self
    }

    /// Message shown to the downstream consumer in a terminal error event.
    ///
    /// Upstream protocol errors pass the vendor text through untouched; every
    /// other variant uses its display form.
    pub fn client_message(&self) -> String {
        match self {
            Self::UpstreamProtocol { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
