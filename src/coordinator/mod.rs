//! Memo engine coordinator.
//!
//! The [`MemoEngine`] owns the frozen [`CacheRegistry`] and the background
//! tasks that keep it healthy:
//! - the remote health monitor (only when remote endpoints exist)
//! - the auto-reload scheduler, including startup warm-up
//! - the periodic metrics exporter
//!
//! # Lifecycle
//!
//! ```text
//! Created → Running → ShuttingDown → Stopped
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use memo_engine::{CacheConfig, CacheRegistry, EngineState, MemoEngine, MemoEngineConfig};
//! use memo_engine::remote::RemoteEndpoints;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = MemoEngineConfig::default();
//! let endpoints = RemoteEndpoints::connect(&config).await?;
//!
//! let mut builder = CacheRegistry::builder(config, endpoints);
//! let roster = builder.register(
//!     CacheConfig::new("Roster.list").auto_reload(true),
//!     |_: ()| async { Ok::<_, std::io::Error>(vec!["ada".to_string()]) },
//! )?;
//!
//! let engine = MemoEngine::start(builder.build());
//! assert_eq!(engine.state(), EngineState::Running);
//!
//! let names = roster.call(()).await?;
//! assert_eq!(names, vec!["ada"]);
//!
//! engine.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::EngineState;

use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::registry::CacheRegistry;
use crate::resilience::health::HealthState;
use crate::stats::CacheStats;

/// Composition root: registry plus background tasks.
pub struct MemoEngine {
    pub(super) registry: Arc<CacheRegistry>,

    /// Engine state (broadcast to watchers)
    pub(super) state: watch::Sender<EngineState>,

    /// Engine state receiver (internal)
    pub(super) state_rx: watch::Receiver<EngineState>,

    /// Flipped to true once to stop every background task
    pub(super) shutdown_tx: watch::Sender<bool>,

    pub(super) tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl MemoEngine {
    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<CacheRegistry> {
        &self.registry
    }

    /// Shared availability of the remote store.
    #[must_use]
    pub fn health(&self) -> &Arc<HealthState> {
        self.registry.health()
    }

    /// Snapshot of every registered cache.
    #[must_use]
    pub fn stats(&self) -> Vec<CacheStats> {
        self.registry.stats()
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state.send(state);
        crate::metrics::set_engine_state(state.as_gauge());
    }
}
