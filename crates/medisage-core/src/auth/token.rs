//! Bearer token acquisition and caching
//!
//! One [`TokenCache`] is shared by every session of the process. Reads of a
//! still-valid token only take a read lock; refreshes are serialized behind an
//! async mutex so that concurrent sessions trigger at most one authorization
//! call.

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// API key/secret pair for the authorization endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct ApiCredentials {
    pub key: String,
    pub secret: String,
}

impl ApiCredentials {
    pub fn new(key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("key", &format!("{}…", self.key.chars().take(4).collect::<String>()))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// Token returned by one authorization call
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds, when the endpoint reports one
    pub expires_in: Option<u64>,
}

/// Cached bearer credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    fn from_grant(grant: TokenGrant, issued_at: DateTime<Utc>) -> Self {
        let lifetime = i64::try_from(grant.expires_in.unwrap_or(0)).unwrap_or(i64::MAX);
        // Lifetimes past the representable range saturate at the latest instant
        let expires_at = Duration::try_seconds(lifetime)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self {
            token: grant.access_token,
            expires_at,
        }
    }

    /// Usable while `now < expires_at - skew`
    pub fn is_valid_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .checked_sub_signed(skew)
            .is_some_and(|limit| now < limit)
    }
}

/// Authorization endpoint abstraction
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Perform exactly one authorization request
    async fn fetch_token(&self, credentials: &ApiCredentials) -> RelayResult<TokenGrant>;
}

/// Process-wide bearer token cache
#[derive(Debug)]
pub struct TokenCache {
    cached: RwLock<Option<Credential>>,
    refresh_lock: Mutex<()>,
    skew: Duration,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(60))
    }
}

impl TokenCache {
    /// Create a cache that treats tokens as expired `skew` before their expiry
    pub fn new(skew: std::time::Duration) -> Self {
        Self {
            cached: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            skew: Duration::from_std(skew).unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    /// Return a valid bearer token, refreshing it through `source` if needed.
    ///
    /// No retry is attempted; any failure is reported as [`RelayError::Auth`].
    #[instrument(skip_all, level = "debug")]
    pub async fn get_token<S: TokenSource + ?Sized>(
        &self,
        source: &S,
        credentials: &ApiCredentials,
    ) -> RelayResult<String> {
        if let Some(token) = self.valid_token() {
            return Ok(token);
        }

        let _guard = self.refresh_lock.lock().await;

        // Another session may have refreshed while we waited for the lock.
        if let Some(token) = self.valid_token() {
            debug!("token refreshed by a concurrent session");
            return Ok(token);
        }

        let issued_at = Utc::now();
        let grant = source
            .fetch_token(credentials)
            .await
            .map_err(|e| match e {
                RelayError::Auth { .. } => e,
                other => RelayError::auth(format!("get_token failed: {}", other)),
            })?;

        if grant.access_token.trim().is_empty() {
            return Err(RelayError::auth("missing access token"));
        }
        if grant.expires_in.unwrap_or(0) == 0 {
            warn!("authorization endpoint returned no token lifetime; token will not be reused");
        }

        let credential = Credential::from_grant(grant, issued_at);
        info!(
            token_len = credential.token.len(),
            expires_at = %credential.expires_at,
            "acquired upstream access token"
        );

        let token = credential.token.clone();
        *self.cached.write() = Some(credential);
        Ok(token)
    }

    /// Drop the cached token so the next call re-authorizes
    pub fn invalidate(&self) {
        *self.cached.write() = None;
    }

    /// Snapshot of the cached credential, valid or not
    pub fn cached(&self) -> Option<Credential> {
        self.cached.read().clone()
    }

    fn valid_token(&self) -> Option<String> {
        let now = Utc::now();
        self.cached
            .read()
            .as_ref()
            .filter(|c| c.is_valid_at(now, self.skew))
            .map(|c| c.token.clone())
    }

    #[cfg(test)]
    fn set_expires_at(&self, expires_at: DateTime<Utc>) {
        if let Some(credential) = self.cached.write().as_mut() {
            credential.expires_at = expires_at;
        }
    }
}
