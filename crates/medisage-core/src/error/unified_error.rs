//! UnifiedError trait implementation for RelayError

use super::types::{RelayError, UnifiedError};

impl UnifiedError for RelayError {
    fn error_code(&self) -> &str {
        match self {
            Self::Config { .. } => "MEDISAGE_CONFIG",
            Self::Auth { .. } => "MEDISAGE_AUTH",
            Self::UpstreamHttp { .. } => "MEDISAGE_UPSTREAM_HTTP",
            Self::UpstreamProtocol { .. } => "MEDISAGE_UPSTREAM_PROTOCOL",
            Self::Json { .. } => "MEDISAGE_JSON",
            Self::Io { .. } => "MEDISAGE_IO",
            Self::Storage { .. } => "MEDISAGE_STORAGE",
            Self::NotFound { .. } => "MEDISAGE_NOT_FOUND",
            Self::InvalidInput { .. } => "MEDISAGE_INVALID_INPUT",
            Self::Cancelled => "MEDISAGE_CANCELLED",
        }
    }

    fn message(&self) -> &str {
        match self {
            Self::Config { message, .. } => message,
            Self::Auth { message, .. } => message,
            Self::UpstreamHttp { message, .. } => message,
            Self::UpstreamProtocol { message, .. } => message,
            Self::Json { message, .. } => message,
            Self::Io { message, .. } => message,
            Self::Storage { message, .. } => message,
            Self::NotFound { message, .. } => message,
            Self::InvalidInput { message, .. } => message,
            Self::Cancelled => "Session was cancelled",
        }
    }

    fn context(&self) -> Option<&str> {
        match self {
            Self::Config { context, .. } => context.as_deref(),
            Self::Auth { context, .. } => context.as_deref(),
            Self::UpstreamHttp { context, .. } => context.as_deref(),
            Self::Json { context, .. } => context.as_deref(),
            Self::Io { context, .. } => context.as_deref(),
            Self::Storage { context, .. } => context.as_deref(),
            Self::UpstreamProtocol { code, .. } => code.as_deref(),
            Self::NotFound { resource_type, .. } => resource_type.as_deref(),
            Self::InvalidInput { field, .. } => field.as_deref(),
            Self::Cancelled => None,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            Self::UpstreamHttp { status_code, .. } => {
                status_code.is_none_or(|code| code >= 500 || code == 429)
            }
            _ => false,
        }
    }
}
