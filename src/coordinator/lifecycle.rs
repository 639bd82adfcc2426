//! Engine lifecycle management: start, background tasks, shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{EngineState, MemoEngine};
use crate::registry::CacheRegistry;
use crate::reload::ReloadScheduler;
use crate::resilience::health::HealthMonitor;

impl MemoEngine {
    /// Take ownership of the registry and spawn the background tasks.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// Startup flow:
    /// 1. Health monitor, if the registry has remote endpoints. Its first
    ///    probe runs immediately.
    /// 2. Reload scheduler, which first warms every auto-reload cache.
    /// 3. Metrics exporter.
    #[tracing::instrument(skip_all)]
    pub fn start(mut registry: CacheRegistry) -> Self {
        let requests = registry.take_reload_requests();
        let registry = Arc::new(registry);
        let config = registry.config().clone();

        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if let Some(endpoints) = registry.endpoints() {
            let monitor = HealthMonitor::new(
                endpoints.clone(),
                Arc::clone(registry.health()),
                config.health_check_interval(),
                config.remote_timeout(),
            );
            tasks.push(("health_monitor", tokio::spawn(monitor.run(shutdown_rx.clone()))));
        } else {
            info!("No remote store configured, running local tier only");
        }

        if let Some(requests) = requests {
            let scheduler = ReloadScheduler::new(
                registry.reload_targets(),
                requests,
                config.maintenance_interval(),
            );
            debug!(
                caches = scheduler.target_count(),
                maintenance_ms = scheduler.maintenance_interval().as_millis() as u64,
                "Reload scheduler configured"
            );
            tasks.push(("reload_scheduler", tokio::spawn(scheduler.run(shutdown_rx.clone()))));
        }

        tasks.push((
            "metrics_exporter",
            tokio::spawn(export_metrics(
                Arc::clone(&registry),
                config.metrics_interval(),
                shutdown_rx,
            )),
        ));

        let engine = Self {
            registry,
            state: state_tx,
            state_rx,
            shutdown_tx,
            tasks: Mutex::new(tasks),
        };
        engine.set_state(EngineState::Running);
        info!("Memo engine running");
        engine
    }

    /// Signal every background task and wait for them to exit.
    /// Safe to call more than once.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }
        info!("Initiating memo engine shutdown...");
        self.set_state(EngineState::ShuttingDown);
        let _ = self.shutdown_tx.send(true);

        for (name, handle) in tasks.drain(..) {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Background task ended abnormally");
            } else {
                debug!(task = name, "Background task stopped");
            }
        }

        self.set_state(EngineState::Stopped);
        info!("Memo engine shutdown complete");
    }
}

async fn export_metrics(
    registry: Arc<CacheRegistry>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                for stats in registry.stats() {
                    crate::metrics::publish_cache_stats(&stats);
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheConfig, MemoEngineConfig};
    use crate::remote::{InMemoryRemoteStore, RemoteEndpoints};

    #[tokio::test]
    async fn test_start_and_shutdown_local_only() {
        let registry = CacheRegistry::builder(MemoEngineConfig::default(), None).build();
        let engine = MemoEngine::start(registry);
        assert_eq!(engine.state(), EngineState::Running);

        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);

        // Second call is a no-op
        engine.shutdown().await;
        assert_eq!(engine.state(), EngineState::Stopped);
    }

    #[tokio::test]
    async fn test_health_monitor_probes_on_start() {
        let store = Arc::new(InMemoryRemoteStore::new("primary"));
        store.set_reachable(false);
        let registry =
            CacheRegistry::builder(MemoEngineConfig::default(), Some(RemoteEndpoints::new(store.clone())))
                .build();

        let engine = MemoEngine::start(registry);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!engine.health().is_available());
        assert!(store.calls() >= 1);

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_warm_up_loads_auto_reload_caches() {
        let mut builder = CacheRegistry::builder(MemoEngineConfig::default(), None);
        let roster = builder
            .register(CacheConfig::new("Roster.list").auto_reload(true), |_: ()| async {
                Ok::<_, String>(vec![1u32, 2, 3])
            })
            .unwrap();

        let engine = MemoEngine::start(builder.build());
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(roster.stats().origin_calls, 1);
        assert_eq!(roster.call(()).await, Ok(vec![1, 2, 3]));
        assert_eq!(roster.stats().origin_calls, 1);

        let mut states = engine.state_receiver();
        engine.shutdown().await;
        assert_eq!(*states.borrow_and_update(), EngineState::Stopped);
    }
}
