use async_trait::async_trait;
use std::time::Duration;

use crate::error::RemoteError;

/// Minimal contract of the shared key-value store behind the remote tier.
///
/// Any store that can get, set, expire and answer a ping is pluggable.
/// Implementations report failures; they never retry, since the bridge
/// sheds load rather than piling requests onto a struggling store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Label used in logs and metrics (e.g. "primary", "replica").
    fn label(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), RemoteError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RemoteError>;
    async fn ping(&self) -> Result<bool, RemoteError>;

    /// Write a value that disappears after `ttl`.
    /// Default implementation is a set followed by an expire.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
        self.set(key, value).await?;
        self.expire(key, ttl).await
    }
}
