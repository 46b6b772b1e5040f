//! Configuration for the relay
//!
//! Configuration is resolved in three layers: built-in defaults, an optional
//! config file (JSON, TOML or YAML), and environment overrides.

pub mod agents;
pub mod env_loader;
pub mod file_loader;
pub mod logging_config;
pub mod model;

pub use agents::{AgentProfile, AgentRegistry, PredefinedQuestions, find_agents, load_agents};
pub use logging_config::LoggingConfig;
pub use model::{RelayConfig, ScoringConfig, StorageConfig, UpstreamConfig};

use crate::error::RelayResult;
use std::path::Path;

/// Load configuration from an optional file and the process environment.
pub fn load_config(path: Option<&Path>) -> RelayResult<RelayConfig> {
    let mut config = match path {
        Some(path) => file_loader::load_from_file(path)?,
        None => RelayConfig::default(),
    };
    env_loader::apply_env_overrides(&mut config)?;
    Ok(config)
}
