// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for memo-engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for installing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `memo_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `cache`: registered cache name, e.g. `Roster.list`
//! - `tier`: local, remote, origin
//! - `outcome`: hit, miss
//! - `status`: success, error, absent

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::stats::CacheStats;

/// Zero-initialise the series of a newly registered cache so dashboards
/// show it before its first request.
pub fn register_cache(cache: &str) {
    for tier in ["local", "remote"] {
        for outcome in ["hit", "miss"] {
            counter!(
                "memo_engine_cache_requests_total",
                "cache" => cache.to_string(),
                "tier" => tier,
                "outcome" => outcome
            )
            .absolute(0);
        }
    }
    gauge!("memo_engine_cache_entries", "cache" => cache.to_string()).set(0.0);
}

/// Record a lookup outcome on one tier
pub fn record_request(cache: &str, tier: &'static str, outcome: &'static str) {
    counter!(
        "memo_engine_cache_requests_total",
        "cache" => cache.to_string(),
        "tier" => tier,
        "outcome" => outcome
    )
    .increment(1);
}

/// Record tier latency
pub fn record_latency(cache: &str, tier: &'static str, duration: Duration) {
    histogram!(
        "memo_engine_operation_seconds",
        "cache" => cache.to_string(),
        "tier" => tier
    )
    .record(duration.as_secs_f64());
}

/// Record a remote-store failure that was absorbed
pub fn record_remote_error(cache: &str, operation: &str, error_type: &str) {
    counter!(
        "memo_engine_remote_errors_total",
        "cache" => cache.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record an origin invocation triggered by a miss
pub fn record_origin_call(cache: &str, status: &'static str) {
    counter!(
        "memo_engine_origin_calls_total",
        "cache" => cache.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record an auto-reload attempt
pub fn record_reload(cache: &str, status: &'static str) {
    counter!(
        "memo_engine_reloads_total",
        "cache" => cache.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Set remote store availability (1 = available, 0 = bypassed)
pub fn set_remote_available(available: bool) {
    gauge!("memo_engine_remote_available").set(if available { 1.0 } else { 0.0 });
}

/// Publish the local-tier snapshot of one cache.
///
/// Hits and misses are cumulative on the cache itself, so they are
/// exported as absolute counter values.
pub fn publish_cache_stats(stats: &CacheStats) {
    let cache = stats.name.clone();
    gauge!("memo_engine_cache_entries", "cache" => cache.clone()).set(stats.local.entries as f64);
    counter!("memo_engine_cache_hits_total", "cache" => cache.clone()).absolute(stats.local.hits);
    counter!("memo_engine_cache_misses_total", "cache" => cache.clone()).absolute(stats.local.misses);
    counter!("memo_engine_cache_evictions_total", "cache" => cache).absolute(stats.local.evictions);
}

/// Engine lifecycle state (0=Created, 1=Running, 2=ShuttingDown, 3=Stopped)
pub fn set_engine_state(state: u8) {
    gauge!("memo_engine_state").set(f64::from(state));
}

/// A timing guard that records latency on drop
pub struct LatencyTimer {
    cache: String,
    tier: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(cache: &str, tier: &'static str) -> Self {
        Self {
            cache: cache.to_string(),
            tier,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(&self.cache, self.tier, self.start.elapsed());
    }
}
