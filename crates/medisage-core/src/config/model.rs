//! Configuration data structures

use super::agents::AgentProfile;
use super::logging_config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default Qingyan assistant API root
pub const DEFAULT_API_ROOT: &str = "https://chatglm.cn/chatglm/assistant-api/v1";

/// Top-level relay configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Upstream assistant API settings
    pub upstream: UpstreamConfig,
    /// Record store location
    pub storage: StorageConfig,
    /// Logging settings
    pub logging: LoggingConfig,
    /// Scoring session settings
    pub scoring: ScoringConfig,
    /// Inline agent list; when empty the agents file in the data dir is used
    pub agents: Vec<AgentProfile>,
}

/// Upstream assistant API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    pub api_root: String,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated while waiting for the next stream chunk.
    /// Replies may take longer than this in total as long as data keeps flowing.
    #[serde(alias = "request_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Cached tokens are treated as expired this many seconds early
    pub token_refresh_skew_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            api_root: DEFAULT_API_ROOT.to_string(),
            api_key: None,
            api_secret: None,
            connect_timeout_secs: 30,
            read_timeout_secs: 120,
            token_refresh_skew_secs: 60,
        }
    }
}

impl UpstreamConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn token_refresh_skew(&self) -> Duration {
        Duration::from_secs(self.token_refresh_skew_secs)
    }

    /// Both halves of the API credential, when configured and non-blank
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let key = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
        let secret = self
            .api_secret
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())?;
        Some((key, secret))
    }
}

/// Record store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl StorageConfig {
    pub fn agents_file(&self) -> PathBuf {
        self.data_dir.join("agents.json")
    }
}

/// Scoring session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Keywords checked by the fallback scorer
    pub keywords: Vec<String>,
    /// Replaces the built-in grading prompt when set
    pub prompt: Option<String>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keywords: crate::scoring::fallback::DEFAULT_KEYWORDS
                .iter()
                .map(|k| k.to_string())
                .collect(),
            prompt: None,
        }
    }
}

impl ScoringConfig {
    pub fn prompt(&self) -> String {
        self.prompt
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(crate::scoring::default_scoring_prompt)
    }
}
