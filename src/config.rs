//! Configuration for the memo engine.
//!
//! # Example
//!
//! ```
//! use memo_engine::{MemoEngineConfig, CacheConfig};
//! use std::time::Duration;
//!
//! // Minimal config (uses defaults, no remote tier)
//! let config = MemoEngineConfig::default();
//! assert_eq!(config.default_max_entries, 1000);
//!
//! // Full config
//! let config = MemoEngineConfig {
//!     redis_url: Some("redis://primary:6379".into()),
//!     redis_replica_url: Some("redis://replica:6379".into()),
//!     split_read_write: true,
//!     redis_prefix: Some("memo:".into()),
//!     ..Default::default()
//! };
//!
//! // Per-cache declaration
//! let roster = CacheConfig::new("Roster.list")
//!     .ttl(Duration::from_secs(600))
//!     .max_entries(100)
//!     .auto_reload(true);
//! assert_eq!(roster.resolved_ttl(&config), Duration::from_secs(600));
//! ```

use serde::Deserialize;
use std::time::Duration;

/// Process-wide configuration.
///
/// All fields have sensible defaults. Without `redis_url` the engine runs
/// local-only and every cache ignores its remote flag.
#[derive(Debug, Clone, Deserialize)]
pub struct MemoEngineConfig {
    /// Global remote-tier switch. When off, no cache talks to the remote store.
    #[serde(default = "default_remote_enabled")]
    pub remote_enabled: bool,

    /// Primary (write) Redis connection string
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Replica (read) Redis connection string
    #[serde(default)]
    pub redis_replica_url: Option<String>,

    /// Read from the replica instead of the primary
    #[serde(default)]
    pub split_read_write: bool,

    /// Optional key prefix for namespacing (e.g., "memo:")
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Upper bound for any single remote call
    #[serde(default = "default_remote_timeout_ms")]
    pub remote_timeout_ms: u64,

    /// Health probe interval
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,

    /// How often auto-reload caches run their expiry maintenance. Never
    /// longer than a quarter of the shortest auto-reload ttl.
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,

    /// How often per-cache gauges are published
    #[serde(default = "default_metrics_interval_ms")]
    pub metrics_interval_ms: u64,

    /// Capacity used when a cache does not declare one
    #[serde(default = "default_max_entries")]
    pub default_max_entries: u64,

    /// TTL used when a cache does not declare one
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: u64,
}

fn default_remote_enabled() -> bool { true }
fn default_remote_timeout_ms() -> u64 { 2_000 }
fn default_health_check_interval_ms() -> u64 { 50_000 }
fn default_maintenance_interval_ms() -> u64 { 1_000 }
fn default_metrics_interval_ms() -> u64 { 10_000 }
fn default_max_entries() -> u64 { 1_000 }
fn default_ttl_secs() -> u64 { 120 * 60 } // 120 minutes

impl Default for MemoEngineConfig {
    fn default() -> Self {
        Self {
            remote_enabled: default_remote_enabled(),
            redis_url: None,
            redis_replica_url: None,
            split_read_write: false,
            redis_prefix: None,
            remote_timeout_ms: default_remote_timeout_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            maintenance_interval_ms: default_maintenance_interval_ms(),
            metrics_interval_ms: default_metrics_interval_ms(),
            default_max_entries: default_max_entries(),
            default_ttl_secs: default_ttl_secs(),
        }
    }
}

impl MemoEngineConfig {
    #[must_use]
    pub fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }

    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    #[must_use]
    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Declarative configuration of a single cache.
///
/// Unset capacity and ttl fall back to the engine defaults when the cache is
/// registered.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// Unique cache name, conventionally `Type.operation`
    pub name: String,
    #[serde(default)]
    pub max_entries: Option<u64>,
    #[serde(default)]
    pub ttl_ms: Option<u64>,
    /// Re-run the operation when its entry expires (zero-argument operations only)
    #[serde(default)]
    pub auto_reload: bool,
    /// Also read/write the shared remote tier
    #[serde(default)]
    pub use_remote_tier: bool,
}

impl CacheConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_entries: None,
            ttl_ms: None,
            auto_reload: false,
            use_remote_tier: false,
        }
    }

    #[must_use]
    pub fn max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_ms = Some(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX));
        self
    }

    #[must_use]
    pub fn auto_reload(mut self, enabled: bool) -> Self {
        self.auto_reload = enabled;
        self
    }

    #[must_use]
    pub fn remote(mut self, enabled: bool) -> Self {
        self.use_remote_tier = enabled;
        self
    }

    #[must_use]
    pub fn resolved_ttl(&self, engine: &MemoEngineConfig) -> Duration {
        self.ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| engine.default_ttl())
    }

    #[must_use]
    pub fn resolved_max_entries(&self, engine: &MemoEngineConfig) -> u64 {
        self.max_entries.unwrap_or(engine.default_max_entries)
    }
}
