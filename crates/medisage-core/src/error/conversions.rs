//! From trait implementations for RelayError conversions

use super::types::RelayError;

impl From<std::io::Error> for RelayError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(error: serde_json::Error) -> Self {
        Self::json(error.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(error: reqwest::Error) -> Self {
        Self::UpstreamHttp {
            message: error.to_string(),
            status_code: error.status().map(|s| s.as_u16()),
            context: error.url().map(|u| u.path().to_string()),
        }
    }
}
