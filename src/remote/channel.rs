//! Per-cache bridge to the remote store.
//!
//! A [`RemoteChannel`] never returns an error. Every call is bounded by the
//! configured timeout; connection-class failures flip the shared
//! [`HealthState`] and read as a miss, decode failures are logged and read
//! as a miss. While the health state is down no call is attempted at all.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use super::codec::ShapeCodec;
use super::traits::RemoteStore;
use super::RemoteEndpoints;
use crate::error::RemoteError;
use crate::resilience::health::HealthState;
use crate::shape::CacheValue;
use crate::stats::{RemoteCounters, RemoteStats};

pub struct RemoteChannel<T> {
    cache: Arc<str>,
    reader: Arc<dyn RemoteStore>,
    writer: Arc<dyn RemoteStore>,
    codec: ShapeCodec<T>,
    health: Arc<HealthState>,
    timeout: Duration,
    counters: RemoteCounters,
}

impl<T: CacheValue> RemoteChannel<T> {
    pub fn new(
        cache: &str,
        endpoints: &RemoteEndpoints,
        health: Arc<HealthState>,
        timeout: Duration,
    ) -> Self {
        Self {
            cache: Arc::from(cache),
            reader: endpoints.reader(),
            writer: endpoints.writer(),
            codec: ShapeCodec::new(),
            health,
            timeout,
            counters: RemoteCounters::default(),
        }
    }

    /// `"{cache}::{args_key}"`. The store adds its own namespace prefix.
    #[must_use]
    pub fn remote_key(&self, local_key: &str) -> String {
        format!("{}::{}", self.cache, local_key)
    }

    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.health.is_available()
    }

    /// Look up a value. `None` covers a miss, an unavailable store and any
    /// failure.
    pub async fn read(&self, local_key: &str) -> Option<T> {
        if !self.is_available() {
            return None;
        }
        let key = self.remote_key(local_key);
        let start = Instant::now();

        let bytes = match self.bounded(self.reader.get(&key)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.absorb(&key, "get", &e);
                return None;
            }
        };
        crate::metrics::record_latency(&self.cache, "remote", start.elapsed());

        let Some(bytes) = bytes else {
            self.counters.record_miss();
            crate::metrics::record_request(&self.cache, "remote", "miss");
            debug!(cache = %self.cache, key = %key, "Remote miss");
            return None;
        };

        match self.codec.decode(&bytes) {
            Ok(value) => {
                self.counters.record_hit();
                crate::metrics::record_request(&self.cache, "remote", "hit");
                debug!(cache = %self.cache, key = %key, "Remote hit");
                Some(value)
            }
            Err(e) => {
                self.absorb(&key, "decode", &e);
                None
            }
        }
    }

    /// Store a value with expiry. Failures are logged and dropped.
    pub async fn write(&self, local_key: &str, value: &T, ttl: Duration) {
        if !self.is_available() {
            return;
        }
        let key = self.remote_key(local_key);

        let bytes = match self.codec.encode(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.absorb(&key, "encode", &e);
                return;
            }
        };

        match self.bounded(self.writer.set_with_ttl(&key, &bytes, ttl)).await {
            Ok(()) => {
                self.counters.record_write();
                debug!(cache = %self.cache, key = %key, ttl_ms = ttl.as_millis() as u64, "Remote write");
            }
            Err(e) => self.absorb(&key, "set", &e),
        }
    }

    #[must_use]
    pub fn stats(&self) -> RemoteStats {
        self.counters.snapshot()
    }

    async fn bounded<R>(
        &self,
        call: impl std::future::Future<Output = Result<R, RemoteError>>,
    ) -> Result<R, RemoteError> {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout(self.timeout)),
        }
    }

    fn absorb(&self, key: &str, operation: &str, err: &RemoteError) {
        self.counters.record_error();
        crate::metrics::record_remote_error(&self.cache, operation, err.kind());

        if err.is_connection_class() {
            warn!(cache = %self.cache, key, operation, error = %err, "Remote call failed, falling back");
            self.health.mark_unavailable(&err.to_string());
        } else {
            error!(cache = %self.cache, key, operation, error = %err, "Remote value does not match declared shape");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use async_trait::async_trait;

    struct HangingStore;

    #[async_trait]
    impl RemoteStore for HangingStore {
        fn label(&self) -> &str {
            "hanging"
        }
        async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(None)
        }
        async fn set(&self, _key: &str, _value: &[u8]) -> Result<(), RemoteError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        }
        async fn expire(&self, _key: &str, _ttl: Duration) -> Result<(), RemoteError> {
            Ok(())
        }
        async fn ping(&self) -> Result<bool, RemoteError> {
            Ok(true)
        }
    }

    fn channel_over<T: CacheValue>(store: Arc<dyn RemoteStore>) -> (RemoteChannel<T>, Arc<HealthState>) {
        let health = Arc::new(HealthState::new());
        let channel = RemoteChannel::new(
            "Roster.list",
            &RemoteEndpoints::new(store),
            Arc::clone(&health),
            Duration::from_millis(50),
        );
        (channel, health)
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let store = Arc::new(InMemoryRemoteStore::new("primary"));
        let (channel, _) = channel_over::<Vec<String>>(store.clone());

        channel.write("[]", &vec!["ada".to_string()], Duration::from_secs(60)).await;
        assert!(store.contains("Roster.list::[]"));

        assert_eq!(channel.read("[]").await, Some(vec!["ada".to_string()]));
        assert_eq!(channel.read("[1]").await, None);

        let stats = channel.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes, stats.errors), (1, 1, 1, 0));
    }

    #[tokio::test]
    async fn test_connection_error_marks_unavailable_and_stops_calls() {
        let store = Arc::new(InMemoryRemoteStore::new("primary"));
        let (channel, health) = channel_over::<u32>(store.clone());
        store.set_reachable(false);

        assert_eq!(channel.read("[1]").await, None);
        assert!(!health.is_available());
        assert_eq!(store.calls(), 1);

        // Bypassed entirely while unavailable
        assert_eq!(channel.read("[1]").await, None);
        channel.write("[1]", &5, Duration::from_secs(1)).await;
        assert_eq!(store.calls(), 1);
    }

    #[tokio::test]
    async fn test_shape_mismatch_is_a_miss_and_keeps_health() {
        let store = Arc::new(InMemoryRemoteStore::new("primary"));
        let (channel, health) = channel_over::<Vec<u32>>(store.clone());
        store.insert_raw("Roster.list::[]", br#"{"not":"a list"}"#.to_vec());

        assert_eq!(channel.read("[]").await, None);
        assert!(health.is_available());
        assert_eq!(channel.stats().errors, 1);
    }

    #[tokio::test]
    async fn test_timeout_is_connection_class() {
        let (channel, health) = channel_over::<u32>(Arc::new(HangingStore));
        let started = Instant::now();

        assert_eq!(channel.read("[1]").await, None);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!health.is_available());
    }

    #[tokio::test]
    async fn test_write_timeout_is_absorbed() {
        let (channel, health) = channel_over::<u32>(Arc::new(HangingStore));
        channel.write("[1]", &1, Duration::from_secs(1)).await;
        assert!(!health.is_available());
        assert_eq!(channel.stats().errors, 1);
    }
}
