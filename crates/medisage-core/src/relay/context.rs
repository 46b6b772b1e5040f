//! Shared services handed to every session

use crate::auth::{ApiCredentials, TokenCache};
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::store::{JsonFileStore, RecordStore};
use crate::upstream::{AgentApi, QingyanClient};
use std::sync::Arc;

/// Process-wide collaborators of the relay.
///
/// Cloning is cheap; every clone shares the same token cache.
#[derive(Clone)]
pub struct RelayContext {
    pub config: Arc<RelayConfig>,
    pub api: Arc<dyn AgentApi>,
    pub tokens: Arc<TokenCache>,
    pub store: Arc<dyn RecordStore>,
}

impl RelayContext {
    pub fn new(config: RelayConfig, api: Arc<dyn AgentApi>, store: Arc<dyn RecordStore>) -> Self {
        let tokens = Arc::new(TokenCache::new(config.upstream.token_refresh_skew()));
        Self {
            config: Arc::new(config),
            api,
            tokens,
            store,
        }
    }

    /// Wire the HTTP client and the JSON file store from configuration
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        let api = Arc::new(QingyanClient::new(&config.upstream)?);
        let store = Arc::new(JsonFileStore::new(config.storage.data_dir.clone()));
        Ok(Self::new(config, api, store))
    }

    /// Bearer token for `credentials`, from the shared cache when still valid
    pub async fn token(&self, credentials: &ApiCredentials) -> RelayResult<String> {
        self.tokens.get_token(self.api.as_ref(), credentials).await
    }
}
