// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Basic memo-engine usage example.
//!
//! Demonstrates:
//! 1. Connecting to Redis (optional: set `REDIS_URL`, otherwise local-only)
//! 2. Registering a parameterised cache and an auto-reload cache
//! 3. Timing first (origin) and repeated (local hit) calls
//! 4. Watching an auto-reload refresh without any caller
//! 5. Displaying metrics captured by a debugging recorder
//! 6. Clean shutdown
//!
//! # Run
//!
//! ```bash
//! REDIS_URL=redis://localhost:6379 cargo run --example basic_usage
//! ```

use metrics_util::debugging::{DebugValue, DebuggingRecorder};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use memo_engine::{CacheConfig, CacheRegistry, MemoEngine, MemoEngineConfig, RemoteEndpoints};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install metrics recorder (captures all metrics for display)
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memo_engine=info".into()),
        )
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║            memo-engine: Basic Usage Example                   ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Configure and connect
    // ─────────────────────────────────────────────────────────────────────────
    let config = MemoEngineConfig {
        redis_url: std::env::var("REDIS_URL").ok(),
        redis_prefix: Some("memo-demo:".into()),
        maintenance_interval_ms: 50,
        metrics_interval_ms: 200,
        ..Default::default()
    };
    let endpoints = RemoteEndpoints::connect(&config).await?;
    let remote = match endpoints {
        Some(ref e) if e.reachable_at_startup() => "redis",
        Some(_) => "redis (unreachable, waiting for the health monitor)",
        None => "disabled",
    };
    println!("📦 Remote tier: {}", remote);

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Register caches
    // ─────────────────────────────────────────────────────────────────────────
    let mut builder = CacheRegistry::builder(config, endpoints);

    let fib = builder.register(
        CacheConfig::new("Math.fib").max_entries(64).remote(true),
        |n: u64| async move {
            // Deliberately slow origin
            tokio::time::sleep(Duration::from_millis(50)).await;
            let (mut a, mut b) = (0u64, 1u64);
            for _ in 0..n {
                (a, b) = (b, a.wrapping_add(b));
            }
            Ok::<_, std::io::Error>(a)
        },
    )?;

    let generation = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&generation);
    let roster = builder.register(
        CacheConfig::new("Roster.list")
            .ttl(Duration::from_millis(500))
            .auto_reload(true)
            .remote(true),
        move |_: ()| {
            let counter = Arc::clone(&counter);
            async move {
                let g = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(vec![format!("alice#{g}"), format!("bob#{g}")])
            }
        },
    )?;

    let engine = MemoEngine::start(builder.build());
    println!("🚀 Engine state: {}", engine.state());

    // ─────────────────────────────────────────────────────────────────────────
    // 3. First call vs repeated call
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n⏱️  Timing Math.fib(80)");
    for attempt in 1..=3 {
        let start = Instant::now();
        let value = fib.call(80).await?;
        println!("   └─ call {} → {} ({:?})", attempt, value, start.elapsed());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Auto-reload
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔄 Roster.list refreshes itself every ~500ms");
    for _ in 0..3 {
        println!("   └─ {:?}", roster.call(()).await?);
        tokio::time::sleep(Duration::from_millis(600)).await;
    }
    println!("   └─ origin ran {} times", generation.load(Ordering::SeqCst));

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📊 Cache stats:");
    for stats in engine.stats() {
        println!(
            "   ├─ {}: {} entries, {} hits, {} misses, hit ratio {:.0}%, origin calls {}",
            stats.name,
            stats.local.entries,
            stats.local.hits,
            stats.local.misses,
            stats.local.hit_ratio() * 100.0,
            stats.origin_calls,
        );
        if let Some(remote) = stats.remote {
            println!("   │  └─ remote: {} hits, {} misses, {} errors", remote.hits, remote.misses, remote.errors);
        }
    }

    println!("\n📈 Recorded metrics:");
    for (key, _, _, value) in snapshotter.snapshot().into_vec() {
        let labels: Vec<String> = key
            .key()
            .labels()
            .map(|l| format!("{}={}", l.key(), l.value()))
            .collect();
        let value = match value {
            DebugValue::Counter(v) => v.to_string(),
            DebugValue::Gauge(v) => format!("{:.0}", v.into_inner()),
            DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
        };
        println!("   └─ {}{{{}}} = {}", key.key().name(), labels.join(","), value);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Shutdown
    // ─────────────────────────────────────────────────────────────────────────
    engine.shutdown().await;
    println!("\n✅ Engine state: {}\n", engine.state());
    Ok(())
}
