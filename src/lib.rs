//! # Memo Engine
//!
//! A two-tier memoization engine for expensive or frequently repeated
//! computations inside a service.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    CachedOperation::call                    │
//! │  • Key derived from the arguments                          │
//! │  • Origin errors pass through, never cached                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Local tier (per cache)                     │
//! │  • moka table, LRU, per-cache ttl and capacity             │
//! │  • Evictions feed the auto-reload scheduler                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ miss
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Remote tier (shared, optional)                │
//! │  • Redis, primary for writes, replica for reads            │
//! │  • Shape-checked JSON, bounded by a timeout                │
//! │  • Bypassed entirely while the health monitor says down    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ miss
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Origin operation                       │
//! │  • Result written to both tiers (absent results nowhere)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use memo_engine::{CacheConfig, CacheRegistry, MemoEngine, MemoEngineConfig};
//! use memo_engine::remote::RemoteEndpoints;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MemoEngineConfig {
//!         redis_url: Some("redis://localhost:6379".into()),
//!         redis_prefix: Some("memo:".into()),
//!         ..Default::default()
//!     };
//!     let endpoints = RemoteEndpoints::connect(&config).await?;
//!
//!     let mut builder = CacheRegistry::builder(config, endpoints);
//!     let user_name = builder.register(
//!         CacheConfig::new("User.name").ttl(Duration::from_secs(600)).remote(true),
//!         |id: u64| async move { Ok::<_, std::io::Error>(format!("user-{id}")) },
//!     )?;
//!
//!     let engine = MemoEngine::start(builder.build());
//!
//!     // Origin on the first call, local tier afterwards
//!     assert_eq!(user_name.call(7).await?, "user-7");
//!     assert_eq!(user_name.call(7).await?, "user-7");
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`registry`]: registration and the [`CachedOperation`] lookup protocol
//! - [`local`]: the in-process tier
//! - [`remote`]: remote store contract, Redis backend, shape codec
//! - [`resilience`]: remote health monitoring, startup retry
//! - [`reload`]: eviction-driven auto-reload
//! - [`coordinator`]: the [`MemoEngine`] and its background tasks

pub mod config;
pub mod coordinator;
pub mod error;
pub mod key;
pub mod local;
pub mod metrics;
pub mod registry;
pub mod reload;
pub mod remote;
pub mod resilience;
pub mod shape;
pub mod stats;

pub use config::{CacheConfig, MemoEngineConfig};
pub use coordinator::{EngineState, MemoEngine};
pub use error::{ConfigError, EngineError, ReloadFailure, RemoteError};
pub use key::{json_key, CacheArgs};
pub use local::{EvictionCause, LocalTier};
pub use registry::{CachePolicy, CacheRegistry, CacheRegistryBuilder, CachedOperation};
pub use remote::{RemoteEndpoints, RemoteStore};
pub use resilience::health::HealthState;
pub use resilience::retry::RetryConfig;
pub use shape::{CacheValue, ResultShape, TypeToken};
pub use stats::{CacheStats, LocalStats, RemoteStats};
pub use metrics::LatencyTimer;
