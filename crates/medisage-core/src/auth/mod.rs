//! Upstream authorization
//!
//! Provides:
//! - The API key/secret pair used to request bearer tokens
//! - A shared, single-flight bearer token cache

mod token;

pub use token::{ApiCredentials, Credential, TokenCache, TokenGrant, TokenSource};

#[cfg(test)]
pub use token::MockTokenSource;
