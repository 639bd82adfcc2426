//! Local (in-process) cache tier.
//!
//! One [`LocalTier`] per registered cache: a bounded, TTL-expiring table
//! backed by moka with least-recently-used eviction. Reads bump hit/miss
//! counters; evictions (expiry or capacity, never explicit invalidation)
//! are reported to an optional hook.
//!
//! Expired entries read as absent immediately, but are only physically
//! purged (and reported to the hook) when the table runs its maintenance.
//! Every [`LocalTier::put`] runs it, so the capacity bound holds as soon as
//! the insert returns; idle tables rely on [`LocalTier::run_pending_tasks`].

use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

use crate::stats::LocalStats;

/// Why an entry left the table without being explicitly removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionCause {
    /// Older than the cache's ttl
    Expired,
    /// Pushed out by the capacity bound
    Capacity,
}

impl std::fmt::Display for EvictionCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "expired"),
            Self::Capacity => write!(f, "capacity"),
        }
    }
}

/// Callback run once per eviction with the evicted key, value and cause.
///
/// Runs inside the table's maintenance, so it must not block: hand the work
/// off to a channel or a spawned task.
pub type EvictionHook<T> = Arc<dyn Fn(&str, &T, EvictionCause) + Send + Sync>;

struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Bounded in-process table for one cache.
#[derive(Clone)]
pub struct LocalTier<T: Clone + Send + Sync + 'static> {
    name: Arc<str>,
    max_entries: u64,
    ttl: Duration,
    entries: Cache<String, T>,
    counters: Arc<Counters>,
}

impl<T: Clone + Send + Sync + 'static> LocalTier<T> {
    /// Create a table without an eviction hook.
    pub fn new(name: &str, max_entries: u64, ttl: Duration) -> Self {
        Self::build(name, max_entries, ttl, None)
    }

    /// Create a table that reports every eviction to `hook`.
    pub fn with_eviction_hook(
        name: &str,
        max_entries: u64,
        ttl: Duration,
        hook: EvictionHook<T>,
    ) -> Self {
        Self::build(name, max_entries, ttl, Some(hook))
    }

    fn build(name: &str, max_entries: u64, ttl: Duration, hook: Option<EvictionHook<T>>) -> Self {
        let counters = Arc::new(Counters {
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        });

        let listener_counters = Arc::clone(&counters);
        let cache_name: Arc<str> = Arc::from(name);
        let listener_name = Arc::clone(&cache_name);

        let entries = Cache::builder()
            .name(name)
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(move |key: Arc<String>, value: T, cause: RemovalCause| {
                let cause = match cause {
                    RemovalCause::Expired => EvictionCause::Expired,
                    RemovalCause::Size => EvictionCause::Capacity,
                    // Explicit removals and replacements are not evictions
                    _ => return,
                };
                listener_counters.evictions.fetch_add(1, Ordering::Relaxed);
                trace!(cache = %listener_name, key = %key, %cause, "Local entry evicted");
                if let Some(ref hook) = hook {
                    hook(key.as_str(), &value, cause);
                }
            })
            .build();

        Self {
            name: cache_name,
            max_entries,
            ttl,
            entries,
            counters,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn max_entries(&self) -> u64 {
        self.max_entries
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a live entry. Counts a hit or a miss.
    pub fn get(&self, key: &str) -> Option<T> {
        match self.entries.get(key) {
            Some(value) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or replace an entry. The ttl restarts from now.
    ///
    /// Pending capacity evictions are applied before returning, so the
    /// table never serves more than `max_entries` live entries.
    pub fn put(&self, key: String, value: T) {
        self.entries.insert(key, value);
        self.entries.run_pending_tasks();
    }

    /// Check presence without touching counters or recency.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.invalidate(key);
    }

    pub fn invalidate_all(&self) {
        self.entries.invalidate_all();
    }

    /// Approximate live entry count (exact after [`run_pending_tasks`](Self::run_pending_tasks)).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Apply pending capacity evictions and purge expired entries, firing
    /// the eviction hook for each.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }

    #[must_use]
    pub fn stats(&self) -> LocalStats {
        LocalStats {
            entries: self.entries.entry_count(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }
}
