//! Environment variable overrides

use super::model::RelayConfig;
use crate::error::{RelayError, RelayResult};
use std::env;
use std::path::PathBuf;

/// Apply overrides from the process environment
///
/// Recognized variables: `QINGYAN_API_KEY`, `QINGYAN_API_SECRET`,
/// `QINGYAN_API_ROOT`, `MEDISAGE_DATA_DIR`, `MEDISAGE_LOG_LEVEL`,
/// `MEDISAGE_READ_TIMEOUT_SECS`.
pub fn apply_env_overrides(config: &mut RelayConfig) -> RelayResult<()> {
    apply_overrides_from(config, |name| env::var(name).ok())
}

/// Apply overrides using an arbitrary variable lookup
pub fn apply_overrides_from<F>(config: &mut RelayConfig, lookup: F) -> RelayResult<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("QINGYAN_API_KEY") {
        config.upstream.api_key = Some(key);
    }
    if let Some(secret) = get("QINGYAN_API_SECRET") {
        config.upstream.api_secret = Some(secret);
    }
    if let Some(root) = get("QINGYAN_API_ROOT") {
        config.upstream.api_root = root.trim_end_matches('/').to_string();
    }
    if let Some(dir) = get("MEDISAGE_DATA_DIR") {
        config.storage.data_dir = PathBuf::from(dir);
    }
    if let Some(level) = get("MEDISAGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(secs) = get("MEDISAGE_READ_TIMEOUT_SECS") {
        config.upstream.read_timeout_secs = secs.trim().parse().map_err(|_| {
            RelayError::config_with_context(
                "Invalid MEDISAGE_READ_TIMEOUT_SECS value",
                format!("Parsing timeout value '{}'", secs),
            )
        })?;
    }

    Ok(())
}
