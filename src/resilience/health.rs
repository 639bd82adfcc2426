// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote-store health gating.
//!
//! Two states, Available and Unavailable, held in a single atomic flag that
//! every remote channel consults before touching the store. The flag goes
//! down on a failed probe or on any connection-class failure seen by the
//! bridge, and only comes back up on a successful probe. While it is down
//! the bridge makes no remote calls at all: no per-request retries, so an
//! outage costs callers nothing but the local tier and the origin.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::remote::RemoteEndpoints;

/// Shared availability of one set of remote endpoints.
#[derive(Debug)]
pub struct HealthState {
    available: AtomicBool,
    /// Consecutive failed probes or failed calls
    failures: AtomicU64,
    last_probe: Mutex<Option<Instant>>,
}

impl HealthState {
    /// Starts Available: the first probe or failure corrects it.
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            failures: AtomicU64::new(0),
            last_probe: Mutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Returns true if this call changed the state.
    pub fn mark_available(&self) -> bool {
        self.failures.store(0, Ordering::Release);
        let was = self.available.swap(true, Ordering::AcqRel);
        if !was {
            crate::metrics::set_remote_available(true);
        }
        !was
    }

    /// Returns true if this call changed the state.
    pub fn mark_unavailable(&self, reason: &str) -> bool {
        self.failures.fetch_add(1, Ordering::AcqRel);
        let was = self.available.swap(false, Ordering::AcqRel);
        if was {
            warn!(reason, "Remote store marked unavailable, bypassing remote tier");
            crate::metrics::set_remote_available(false);
        }
        was
    }

    /// Starts Unavailable: the remote tier stays bypassed until a probe
    /// succeeds.
    #[must_use]
    pub fn unavailable() -> Self {
        Self {
            available: AtomicBool::new(false),
            failures: AtomicU64::new(1),
            last_probe: Mutex::new(None),
        }
    }

    /// Consecutive failures since the store was last seen healthy.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn last_probe(&self) -> Option<Instant> {
        *self.last_probe.lock()
    }

    fn record_probe(&self) {
        *self.last_probe.lock() = Some(Instant::now());
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodic liveness probe for the remote endpoints.
pub struct HealthMonitor {
    endpoints: RemoteEndpoints,
    state: Arc<HealthState>,
    interval: Duration,
    probe_timeout: Duration,
}

impl HealthMonitor {
    pub fn new(
        endpoints: RemoteEndpoints,
        state: Arc<HealthState>,
        interval: Duration,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            endpoints,
            state,
            interval,
            probe_timeout,
        }
    }

    /// Ping every distinct endpoint once. All must answer for Available.
    pub async fn probe_once(&self) -> bool {
        for store in self.endpoints.probe_targets() {
            let outcome = match timeout(self.probe_timeout, store.ping()).await {
                Ok(Ok(true)) => None,
                Ok(Ok(false)) => Some("unexpected ping reply".to_string()),
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("ping timed out after {:?}", self.probe_timeout)),
            };
            if let Some(reason) = outcome {
                debug!(endpoint = store.label(), %reason, "Remote probe failed");
                crate::metrics::record_remote_error("health", "ping", "probe");
                self.state.record_probe();
                self.state.mark_unavailable(&format!("{}: {}", store.label(), reason));
                return false;
            }
        }
        self.state.record_probe();
        if self.state.mark_available() {
            info!("Remote store reachable again, resuming remote tier");
        }
        true
    }

    /// Probe on a fixed interval until `shutdown` flips to true.
    #[tracing::instrument(skip_all)]
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!("Health monitor running");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("Health monitor stopped");
    }
}
