//! Remote cache bridge.
//!
//! - [`RemoteStore`]: the minimal key-value contract (Redis or in-memory)
//! - [`RemoteEndpoints`]: write (primary) and read (replica or primary) handles
//! - [`ShapeCodec`]: shape-aware JSON codec
//! - [`RemoteChannel`]: per-cache bridge combining the above, with timeouts,
//!   health gating and failure absorption

pub mod channel;
pub mod codec;
pub mod memory;
pub mod redis;
pub mod traits;

pub use channel::RemoteChannel;
pub use codec::ShapeCodec;
pub use memory::InMemoryRemoteStore;
pub use redis::RedisRemoteStore;
pub use traits::RemoteStore;

use std::sync::Arc;
use tracing::warn;

use crate::config::MemoEngineConfig;
use crate::error::EngineError;
use crate::resilience::retry::RetryConfig;

/// Write and read handles for the remote store.
///
/// Reads go to the replica when one is attached, writes always go to the
/// primary. The choice is made here, once, rather than on every call.
#[derive(Clone)]
pub struct RemoteEndpoints {
    primary: Arc<dyn RemoteStore>,
    replica: Option<Arc<dyn RemoteStore>>,
    reachable_at_startup: bool,
}

impl std::fmt::Debug for RemoteEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteEndpoints")
            .field("has_replica", &self.replica.is_some())
            .field("reachable_at_startup", &self.reachable_at_startup)
            .finish_non_exhaustive()
    }
}

impl RemoteEndpoints {
    /// Single instance serving reads and writes.
    pub fn new(primary: Arc<dyn RemoteStore>) -> Self {
        Self {
            primary,
            replica: None,
            reachable_at_startup: true,
        }
    }

    /// Route reads to a separate replica.
    #[must_use]
    pub fn with_replica(mut self, replica: Arc<dyn RemoteStore>) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Open Redis endpoints according to the engine config.
    ///
    /// Returns `Ok(None)` when the remote tier is switched off or no url is
    /// configured. A replica is only connected when `split_read_write` is on.
    ///
    /// Only a malformed url is an error. An endpoint that cannot be reached
    /// after the startup retries is still returned: the engine starts with
    /// the remote tier unavailable and the health monitor brings it up once
    /// a probe succeeds.
    pub async fn connect(config: &MemoEngineConfig) -> Result<Option<Self>, EngineError> {
        Self::connect_with(config, &RetryConfig::startup()).await
    }

    async fn connect_with(config: &MemoEngineConfig, retry: &RetryConfig) -> Result<Option<Self>, EngineError> {
        if !config.remote_enabled {
            return Ok(None);
        }
        let Some(ref primary_url) = config.redis_url else {
            return Ok(None);
        };
        let prefix = config.redis_prefix.as_deref();

        let primary = RedisRemoteStore::unconnected("primary", primary_url, prefix)?;
        let mut reachable = open_at_startup(&primary, retry).await;
        let mut endpoints = Self::new(Arc::new(primary));

        if config.split_read_write {
            if let Some(ref replica_url) = config.redis_replica_url {
                let replica = RedisRemoteStore::unconnected("replica", replica_url, prefix)?;
                reachable &= open_at_startup(&replica, retry).await;
                endpoints = endpoints.with_replica(Arc::new(replica));
            }
        }
        if !reachable {
            endpoints = endpoints.unreachable_at_startup();
        }
        Ok(Some(endpoints))
    }

    /// Start the engine with the remote tier unavailable until the first
    /// successful health probe.
    #[must_use]
    pub fn unreachable_at_startup(mut self) -> Self {
        self.reachable_at_startup = false;
        self
    }

    #[must_use]
    pub fn reachable_at_startup(&self) -> bool {
        self.reachable_at_startup
    }

    #[must_use]
    pub fn writer(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(&self.primary)
    }

    #[must_use]
    pub fn reader(&self) -> Arc<dyn RemoteStore> {
        Arc::clone(self.replica.as_ref().unwrap_or(&self.primary))
    }

    /// Every distinct endpoint, primary first.
    #[must_use]
    pub fn probe_targets(&self) -> Vec<Arc<dyn RemoteStore>> {
        let mut targets = vec![Arc::clone(&self.primary)];
        if let Some(ref replica) = self.replica {
            if !Arc::ptr_eq(replica, &self.primary) {
                targets.push(Arc::clone(replica));
            }
        }
        targets
    }
}

async fn open_at_startup(store: &RedisRemoteStore, retry: &RetryConfig) -> bool {
    match store.connect_with_retry(retry).await {
        Ok(()) => true,
        Err(e) => {
            warn!(
                endpoint = store.label(),
                error = %e,
                "Redis unreachable at startup, continuing with the remote tier unavailable"
            );
            crate::metrics::set_remote_available(false);
            false
        }
    }
}
