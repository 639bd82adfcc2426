//! Cache registration.
//!
//! Every cached operation is registered once, at startup, through a
//! [`CacheRegistryBuilder`]. Registration validates the configuration,
//! derives the result shape from the value type, wires the local tier,
//! the remote channel and the eviction hook, and hands back the
//! [`CachedOperation`] the caller uses from then on. [`build`] freezes the
//! set; nothing can be registered afterwards.
//!
//! [`build`]: CacheRegistryBuilder::build

pub mod operation;

pub use operation::CachedOperation;

use std::collections::BTreeMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::{CacheConfig, MemoEngineConfig};
use crate::error::ConfigError;
use crate::key::CacheArgs;
use crate::local::{EvictionCause, EvictionHook, LocalTier};
use crate::reload::{ReloadRequest, Reloadable};
use crate::remote::{RemoteChannel, RemoteEndpoints};
use crate::resilience::health::HealthState;
use crate::shape::{CacheValue, ResultShape};
use crate::stats::CacheStats;
use operation::{Origin, OriginFuture};

/// Resolved, immutable settings of one registered cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub name: String,
    pub max_entries: u64,
    pub ttl: Duration,
    pub auto_reload: bool,
    /// False when requested but the engine runs without a remote store
    pub use_remote_tier: bool,
    pub result_shape: ResultShape,
}

/// Type-erased view used for stats and background work.
trait ManagedCache: Send + Sync {
    fn stats(&self) -> CacheStats;
}

impl<A, T, E> ManagedCache for CachedOperation<A, T, E>
where
    A: CacheArgs,
    T: CacheValue,
    E: Display + Send + 'static,
{
    fn stats(&self) -> CacheStats {
        CachedOperation::stats(self)
    }
}

struct Registered {
    policy: CachePolicy,
    handle: Arc<dyn ManagedCache>,
    reloader: Option<Arc<dyn Reloadable>>,
}

pub struct CacheRegistryBuilder {
    config: MemoEngineConfig,
    endpoints: Option<RemoteEndpoints>,
    health: Arc<HealthState>,
    caches: BTreeMap<String, Registered>,
    reload_tx: mpsc::UnboundedSender<ReloadRequest>,
    reload_rx: mpsc::UnboundedReceiver<ReloadRequest>,
}

impl CacheRegistryBuilder {
    fn new(config: MemoEngineConfig, endpoints: Option<RemoteEndpoints>) -> Self {
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();
        let endpoints = if config.remote_enabled { endpoints } else { None };
        let health = match endpoints {
            Some(ref e) if !e.reachable_at_startup() => HealthState::unavailable(),
            _ => HealthState::new(),
        };
        Self {
            config,
            endpoints,
            health: Arc::new(health),
            caches: BTreeMap::new(),
            reload_tx,
            reload_rx,
        }
    }

    /// Register an operation and get back its cached form.
    ///
    /// `origin` is the uncached computation. Its errors pass through
    /// [`CachedOperation::call`] unchanged.
    pub fn register<A, T, E, F, Fut>(
        &mut self,
        cache: CacheConfig,
        origin: F,
    ) -> Result<CachedOperation<A, T, E>, ConfigError>
    where
        A: CacheArgs,
        T: CacheValue,
        E: Display + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let policy = self.resolve::<A, T>(&cache)?;

        let local = if policy.auto_reload {
            let tx = self.reload_tx.clone();
            let name: Arc<str> = Arc::from(policy.name.as_str());
            let hook: EvictionHook<T> = Arc::new(move |_key: &str, _value: &T, cause: EvictionCause| {
                // Closed only after the scheduler is gone
                let _ = tx.send(ReloadRequest { cache: Arc::clone(&name), cause });
            });
            LocalTier::with_eviction_hook(&policy.name, policy.max_entries, policy.ttl, hook)
        } else {
            LocalTier::new(&policy.name, policy.max_entries, policy.ttl)
        };

        let remote = match self.endpoints {
            Some(ref endpoints) if policy.use_remote_tier => Some(RemoteChannel::new(
                &policy.name,
                endpoints,
                Arc::clone(&self.health),
                self.config.remote_timeout(),
            )),
            _ => None,
        };

        let origin: Origin<A, T, E> = Arc::new(move |args: A| -> OriginFuture<T, E> { Box::pin(origin(args)) });
        let operation = CachedOperation::new(policy.clone(), local, remote, origin);

        crate::metrics::register_cache(&policy.name);
        info!(
            cache = %policy.name,
            max_entries = policy.max_entries,
            ttl_ms = policy.ttl.as_millis() as u64,
            auto_reload = policy.auto_reload,
            remote = policy.use_remote_tier,
            shape = %policy.result_shape,
            "Cache registered"
        );

        let reloader: Option<Arc<dyn Reloadable>> = if policy.auto_reload {
            Some(Arc::new(operation.clone()))
        } else {
            None
        };
        self.caches.insert(
            policy.name.clone(),
            Registered {
                policy,
                handle: Arc::new(operation.clone()),
                reloader,
            },
        );
        Ok(operation)
    }

    fn resolve<A: CacheArgs, T: CacheValue>(&self, cache: &CacheConfig) -> Result<CachePolicy, ConfigError> {
        let name = cache.name.clone();
        if self.caches.contains_key(&name) {
            return Err(ConfigError::DuplicateName(name));
        }
        let ttl = cache.resolved_ttl(&self.config);
        if ttl.is_zero() {
            return Err(ConfigError::InvalidTtl(name));
        }
        let max_entries = cache.resolved_max_entries(&self.config);
        if max_entries == 0 {
            return Err(ConfigError::InvalidCapacity(name));
        }
        if cache.auto_reload && A::unit().is_none() {
            return Err(ConfigError::AutoReloadRequiresZeroArgs(name));
        }

        let use_remote_tier = cache.use_remote_tier && self.endpoints.is_some();
        if cache.use_remote_tier && !use_remote_tier {
            debug!(cache = %name, "No remote store configured, cache runs local-only");
        }

        Ok(CachePolicy {
            name,
            max_entries,
            ttl,
            auto_reload: cache.auto_reload,
            use_remote_tier,
            result_shape: T::shape(),
        })
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> CacheRegistry {
        info!(caches = self.caches.len(), remote = self.endpoints.is_some(), "Cache registry built");
        CacheRegistry {
            config: self.config,
            endpoints: self.endpoints,
            health: self.health,
            caches: self.caches,
            reload_rx: Some(self.reload_rx),
        }
    }
}

/// The frozen set of registered caches.
pub struct CacheRegistry {
    config: MemoEngineConfig,
    endpoints: Option<RemoteEndpoints>,
    health: Arc<HealthState>,
    caches: BTreeMap<String, Registered>,
    reload_rx: Option<mpsc::UnboundedReceiver<ReloadRequest>>,
}

impl CacheRegistry {
    /// Start registering caches. `endpoints` is ignored when the engine
    /// config disables the remote tier.
    #[must_use]
    pub fn builder(config: MemoEngineConfig, endpoints: Option<RemoteEndpoints>) -> CacheRegistryBuilder {
        CacheRegistryBuilder::new(config, endpoints)
    }

    #[must_use]
    pub fn lookup_policy(&self, name: &str) -> Option<&CachePolicy> {
        self.caches.get(name).map(|c| &c.policy)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.caches.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.caches.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> Vec<CacheStats> {
        self.caches.values().map(|c| c.handle.stats()).collect()
    }

    #[must_use]
    pub fn stats_for(&self, name: &str) -> Option<CacheStats> {
        self.caches.get(name).map(|c| c.handle.stats())
    }

    #[must_use]
    pub fn config(&self) -> &MemoEngineConfig {
        &self.config
    }

    #[must_use]
    pub fn endpoints(&self) -> Option<&RemoteEndpoints> {
        self.endpoints.as_ref()
    }

    #[must_use]
    pub fn health(&self) -> &Arc<HealthState> {
        &self.health
    }

    pub(crate) fn reload_targets(&self) -> Vec<Arc<dyn Reloadable>> {
        self.caches.values().filter_map(|c| c.reloader.clone()).collect()
    }

    pub(crate) fn take_reload_requests(&mut self) -> Option<mpsc::UnboundedReceiver<ReloadRequest>> {
        self.reload_rx.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InMemoryRemoteStore;
    use crate::shape::TypeToken;

    fn ok_origin<A>() -> impl Fn(A) -> std::future::Ready<Result<u32, String>> + Send + Sync + 'static {
        |_| std::future::ready(Ok(1))
    }

    #[test]
    fn test_policy_resolves_defaults_and_shape() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        builder
            .register(CacheConfig::new("Roster.list"), |_: ()| async {
                Ok::<Vec<String>, String>(vec![])
            })
            .unwrap();
        let registry = builder.build();

        let policy = registry.lookup_policy("Roster.list").unwrap();
        assert_eq!(policy.max_entries, 1000);
        assert_eq!(policy.ttl, Duration::from_secs(7200));
        assert!(!policy.auto_reload);
        assert_eq!(policy.result_shape, ResultShape::List(TypeToken::of::<String>()));
        assert!(registry.lookup_policy("Nope.none").is_none());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        builder.register(CacheConfig::new("User.by_id"), ok_origin::<u32>()).unwrap();
        let err = builder
            .register(CacheConfig::new("User.by_id"), ok_origin::<u64>())
            .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateName("User.by_id".into()));
    }

    #[test]
    fn test_auto_reload_requires_zero_args() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        let err = builder
            .register(CacheConfig::new("User.by_id").auto_reload(true), ok_origin::<u32>())
            .unwrap_err();
        assert_eq!(err, ConfigError::AutoReloadRequiresZeroArgs("User.by_id".into()));

        assert!(builder
            .register(CacheConfig::new("Roster.list").auto_reload(true), ok_origin::<()>())
            .is_ok());
    }

    #[test]
    fn test_zero_ttl_and_capacity_are_rejected() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        let err = builder
            .register(CacheConfig::new("A.a").ttl(Duration::ZERO), ok_origin::<u32>())
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidTtl("A.a".into()));

        let err = builder
            .register(CacheConfig::new("B.b").max_entries(0), ok_origin::<u32>())
            .unwrap_err();
        assert_eq!(err, ConfigError::InvalidCapacity("B.b".into()));
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_remote_flag_needs_endpoints() {
        let store: Arc<InMemoryRemoteStore> = Arc::new(InMemoryRemoteStore::new("primary"));
        let endpoints = RemoteEndpoints::new(store);

        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), Some(endpoints.clone()));
        let shared = builder.register(CacheConfig::new("A.a").remote(true), ok_origin::<u32>()).unwrap();
        let private = builder.register(CacheConfig::new("B.b"), ok_origin::<u32>()).unwrap();
        assert!(shared.has_remote_tier());
        assert!(!private.has_remote_tier());

        let disabled = MemoEngineConfig {
            remote_enabled: false,
            ..Default::default()
        };
        let mut builder = CacheRegistry::builder(disabled, Some(endpoints));
        let op = builder.register(CacheConfig::new("A.a").remote(true), ok_origin::<u32>()).unwrap();
        assert!(!op.has_remote_tier());
        assert!(!op.policy().use_remote_tier);
    }

    #[tokio::test]
    async fn test_unreachable_endpoints_start_unavailable_and_recover() {
        let store = Arc::new(InMemoryRemoteStore::new("primary"));
        let endpoints = RemoteEndpoints::new(store.clone()).unreachable_at_startup();

        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), Some(endpoints.clone()));
        let op = builder.register(CacheConfig::new("A.a").remote(true), ok_origin::<u32>()).unwrap();
        let registry = builder.build();

        assert!(!registry.health().is_available());
        assert!(op.has_remote_tier());
        assert_eq!(op.call(5).await, Ok(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.calls(), 0);

        let monitor = crate::resilience::health::HealthMonitor::new(
            endpoints,
            Arc::clone(registry.health()),
            Duration::from_secs(60),
            Duration::from_millis(100),
        );
        assert!(monitor.probe_once().await);
        assert!(registry.health().is_available());

        assert_eq!(op.call(6).await, Ok(1));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(store.contains("A.a::6"));
    }

    #[test]
    fn test_reload_targets_and_names() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        builder.register(CacheConfig::new("Z.last"), ok_origin::<u32>()).unwrap();
        builder
            .register(CacheConfig::new("A.first").auto_reload(true), ok_origin::<()>())
            .unwrap();
        let mut registry = builder.build();

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["A.first", "Z.last"]);
        assert_eq!(registry.reload_targets().len(), 1);
        assert!(registry.take_reload_requests().is_some());
        assert!(registry.take_reload_requests().is_none());
        assert_eq!(registry.stats().len(), 2);
        assert_eq!(registry.stats_for("Z.last").unwrap().origin_calls, 0);
    }
}
