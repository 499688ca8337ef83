//! Bearer token supplier port
//!
//! The data-plane never runs a login flow or touches token storage. It asks a
//! [`TokenSupplier`] for a currently valid access token once per request
//! attempt. Implementations may refresh silently (and therefore perform their
//! own network I/O); a failure is surfaced to the caller unchanged and is
//! never retried by the transport.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific (keyring, OAuth refresh, ...).
//! - Uses `#[async_trait]` so the trait is object safe and can be shared as
//!   `Arc<dyn TokenSupplier>`.

use async_trait::async_trait;

/// Supplies bearer tokens for authenticated requests
#[async_trait]
pub trait TokenSupplier: Send + Sync {
    /// Returns a currently valid access token
    async fn access_token(&self) -> anyhow::Result<String>;
}

/// A supplier that always returns the same token
///
/// Useful for short-lived tools and tests where the caller already holds a
/// fresh token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl std::fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticToken(<redacted>)")
    }
}

#[async_trait]
impl TokenSupplier for StaticToken {
    async fn access_token(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}
