//! Eviction-driven auto-reload.
//!
//! Caches registered with auto-reload hand every local eviction to an
//! unbounded channel from inside the eviction hook. The scheduler drains
//! that channel on its own task: an `Expired` eviction re-runs the
//! operation and stores the fresh result, a `Capacity` eviction is ignored.
//!
//! Each target also reports when its held value is due for a refresh, a
//! short lead before the value's ttl runs out. The scheduler sleeps until
//! the earliest of those instants and reloads the target then, so the
//! fresh value replaces the old one before callers can observe a gap.
//! Expiry events remain the fallback when a refresh fails or is missed.
//!
//! The local tier only notices expiry during maintenance, so the scheduler
//! also runs maintenance on every auto-reload cache at a fixed interval,
//! never longer than a quarter of the shortest auto-reload ttl.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{interval, sleep_until, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::error::ReloadFailure;
use crate::local::EvictionCause;

pub type ReloadFuture = Pin<Box<dyn Future<Output = Result<(), ReloadFailure>> + Send>>;

/// Upper bound on how early a value is refreshed before it expires.
const MAX_REFRESH_LEAD: Duration = Duration::from_secs(1);

const MIN_MAINTENANCE_INTERVAL: Duration = Duration::from_millis(1);

/// How long before expiry a value with this ttl is refreshed.
pub(crate) fn refresh_lead(ttl: Duration) -> Duration {
    (ttl / 5).min(MAX_REFRESH_LEAD)
}

/// An eviction reported by a cache's local tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadRequest {
    pub cache: Arc<str>,
    pub cause: EvictionCause,
}

/// A cache the scheduler can refresh without knowing its types.
pub trait Reloadable: Send + Sync {
    fn name(&self) -> &str;

    fn ttl(&self) -> Duration;

    /// Invoke the origin and store its result in every enabled tier.
    fn reload(&self) -> ReloadFuture;

    /// First load at engine start. Goes through the normal lookup path,
    /// so a value already on the remote tier is reused.
    fn warm_up(&self) -> ReloadFuture;

    /// When the held value should be reloaded. `None` while nothing is
    /// held or a reload has taken the value over.
    fn refresh_due(&self) -> Option<Instant>;

    /// Purge expired entries so their evictions are reported.
    fn run_maintenance(&self);
}

pub struct ReloadScheduler {
    targets: HashMap<String, Arc<dyn Reloadable>>,
    requests: mpsc::UnboundedReceiver<ReloadRequest>,
    maintenance_interval: Duration,
}

impl ReloadScheduler {
    pub fn new(
        targets: Vec<Arc<dyn Reloadable>>,
        requests: mpsc::UnboundedReceiver<ReloadRequest>,
        maintenance_interval: Duration,
    ) -> Self {
        let maintenance_interval = targets
            .iter()
            .map(|target| target.ttl() / 4)
            .fold(maintenance_interval, |shortest, quarter| shortest.min(quarter))
            .max(MIN_MAINTENANCE_INTERVAL);
        let targets = targets
            .into_iter()
            .map(|target| (target.name().to_string(), target))
            .collect();
        Self {
            targets,
            requests,
            maintenance_interval,
        }
    }

    #[must_use]
    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    /// Effective maintenance period after clamping to the shortest ttl.
    #[must_use]
    pub fn maintenance_interval(&self) -> Duration {
        self.maintenance_interval
    }

    /// Warm every target, then serve reload requests, refreshes and
    /// maintenance ticks until `shutdown` flips to true. In-flight reloads
    /// are aborted on exit.
    #[tracing::instrument(skip_all)]
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut in_flight = JoinSet::new();
        // At most one load per target at a time
        let mut busy = HashSet::new();

        for (name, target) in &self.targets {
            launch(name, "warm-up", target.warm_up(), &mut busy, &mut in_flight);
        }
        if !self.targets.is_empty() {
            info!(caches = self.targets.len(), "Auto-reload scheduler started");
        }

        let mut ticker = interval(self.maintenance_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let next_refresh = self.next_refresh(&busy);
            let wake = next_refresh.unwrap_or_else(|| Instant::now() + self.maintenance_interval);

            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(request) => self.dispatch(request, &mut busy, &mut in_flight),
                        None => {
                            debug!("Reload channel closed");
                            break;
                        }
                    }
                }
                _ = ticker.tick() => {
                    for target in self.targets.values() {
                        target.run_maintenance();
                    }
                }
                _ = sleep_until(wake.into()), if next_refresh.is_some() => {
                    self.refresh_due_targets(&mut busy, &mut in_flight);
                }
                Some(done) = in_flight.join_next() => {
                    match done {
                        Ok(name) => {
                            busy.remove(&name);
                        }
                        Err(e) => warn!(error = %e, "Background load task failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        in_flight.shutdown().await;
        debug!("Auto-reload scheduler stopped");
    }

    fn next_refresh(&self, busy: &HashSet<String>) -> Option<Instant> {
        self.targets
            .iter()
            .filter(|(name, _)| !busy.contains(*name))
            .filter_map(|(_, target)| target.refresh_due())
            .min()
    }

    fn refresh_due_targets(&self, busy: &mut HashSet<String>, in_flight: &mut JoinSet<String>) {
        let now = Instant::now();
        for (name, target) in &self.targets {
            if busy.contains(name) || !target.refresh_due().is_some_and(|due| due <= now) {
                continue;
            }
            debug!(cache = %name, "Refreshing ahead of expiry");
            launch(name, "refresh", target.reload(), busy, in_flight);
        }
    }

    fn dispatch(&self, request: ReloadRequest, busy: &mut HashSet<String>, in_flight: &mut JoinSet<String>) {
        if request.cause != EvictionCause::Expired {
            debug!(cache = %request.cache, cause = %request.cause, "Eviction ignored for reload");
            return;
        }
        let Some((name, target)) = self.targets.get_key_value(request.cache.as_ref()) else {
            warn!(cache = %request.cache, "Reload requested for unknown cache");
            return;
        };
        if busy.contains(name) {
            debug!(cache = %name, "Entry expired while a load is running");
            return;
        }

        debug!(cache = %name, "Entry expired, reloading");
        launch(name, "reload", target.reload(), busy, in_flight);
    }
}

fn launch(
    name: &str,
    phase: &'static str,
    load: ReloadFuture,
    busy: &mut HashSet<String>,
    in_flight: &mut JoinSet<String>,
) {
    busy.insert(name.to_string());
    let name = name.to_string();
    in_flight.spawn(async move {
        match load.await {
            Ok(()) => debug!(cache = %name, phase, "Background load complete"),
            Err(e) => warn!(cache = %e.cache, phase, reason = %e.reason, "Background load failed, entry stays empty"),
        }
        name
    });
}
