//! Redis implementation of the remote store.
//!
//! Values are opaque byte strings (`SET`/`GET`); expiry uses millisecond
//! precision so sub-second ttls survive the round trip. The connection is a
//! [`ConnectionManager`], which reconnects on its own after the store comes
//! back; the health monitor decides when the bridge starts using it again.
//!
//! A store whose first connect failed stays usable: the next command (in
//! practice the health monitor's ping) tries to open the connection again.

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{cmd, AsyncCommands, Client};
use std::time::Duration;
use tracing::info;

use super::traits::RemoteStore;
use crate::error::RemoteError;
use crate::resilience::retry::{retry, RetryConfig};

pub struct RedisRemoteStore {
    label: String,
    client: Client,
    /// `None` until the first successful connect
    connection: Mutex<Option<ConnectionManager>>,
    /// Optional key prefix for namespacing (e.g., "memo:" → "memo:Roster.list::[]")
    prefix: String,
}

impl RedisRemoteStore {
    /// Connect without a key prefix.
    pub async fn new(label: &str, connection_string: &str) -> Result<Self, RemoteError> {
        Self::with_prefix(label, connection_string, None).await
    }

    /// Connect with an optional key prefix, retrying with the startup policy.
    ///
    /// The prefix is prepended to all keys, enabling namespacing when
    /// sharing a Redis instance with other applications.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use memo_engine::remote::RedisRemoteStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let primary = RedisRemoteStore::with_prefix("primary", "redis://localhost", Some("memo:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(
        label: &str,
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, RemoteError> {
        let store = Self::unconnected(label, connection_string, prefix)?;
        store.connect_with_retry(&RetryConfig::startup()).await?;
        Ok(store)
    }

    /// Validate the url without opening a connection.
    pub fn unconnected(
        label: &str,
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, RemoteError> {
        let client = Client::open(connection_string)
            .map_err(|e| RemoteError::Connection(e.to_string()))?;
        Ok(Self {
            label: label.to_string(),
            client,
            connection: Mutex::new(None),
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Open the connection, retrying per `config`.
    pub async fn connect_with_retry(&self, config: &RetryConfig) -> Result<(), RemoteError> {
        let connection = retry("redis_connect", config, || async {
            self.open_manager().await
        })
        .await
        .map_err(|e: redis::RedisError| RemoteError::Connection(e.to_string()))?;

        *self.connection.lock() = Some(connection);
        info!(endpoint = %self.label, prefix = %self.prefix, "Redis remote store connected");
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    /// One connection attempt. Retrying is left to the startup policy and
    /// to the health monitor's probes.
    async fn open_manager(&self) -> redis::RedisResult<ConnectionManager> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(0);
        ConnectionManager::new_with_config(self.client.clone(), config).await
    }

    /// The open connection, or a single fresh attempt to open one.
    async fn connection(&self) -> Result<ConnectionManager, RemoteError> {
        let existing = self.connection.lock().clone();
        if let Some(connection) = existing {
            return Ok(connection);
        }
        let connection = self.open_manager().await?;
        info!(endpoint = %self.label, "Redis remote store connected");
        *self.connection.lock() = Some(connection.clone());
        Ok(connection)
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn ttl_millis(ttl: Duration) -> i64 {
    // PEXPIRE rejects 0; round sub-millisecond ttls up
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}

#[async_trait]
impl RemoteStore for RedisRemoteStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let mut conn = self.connection().await?;
        let data: Option<Vec<u8>> = conn.get(self.prefixed_key(key)).await?;
        Ok(data)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let _: () = conn.set(self.prefixed_key(key), value).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let _: () = conn.pexpire(self.prefixed_key(key), ttl_millis(ttl)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<bool, RemoteError> {
        let mut conn = self.connection().await?;
        let pong: String = cmd("PING").query_async(&mut conn).await?;
        Ok(pong == "PONG")
    }

    /// Single `SET key value PX ttl` so a value is never left without expiry.
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), RemoteError> {
        let mut conn = self.connection().await?;
        let _: () = cmd("SET")
            .arg(self.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis_rounds_up_to_one() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2000);
    }

    #[tokio::test]
    async fn test_bad_url_is_connection_error() {
        let result = RedisRemoteStore::new("primary", "not-a-redis-url").await;
        assert!(matches!(result, Err(RemoteError::Connection(_))));
        assert!(RedisRemoteStore::unconnected("primary", "not-a-redis-url", None).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_store_retries_on_each_command() {
        // Nothing listens on port 1
        let store = RedisRemoteStore::unconnected("primary", "redis://127.0.0.1:1", Some("memo:")).unwrap();
        assert!(!store.is_connected());
        assert!(store.connect_with_retry(&RetryConfig::test()).await.is_err());

        let err = store.ping().await.unwrap_err();
        assert!(err.is_connection_class());
        assert!(!store.is_connected());
        assert_eq!(store.prefixed_key("k"), "memo:k");
    }
}
