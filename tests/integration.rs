//! Integration tests against a real Redis.
//!
//! Tests use testcontainers for portability - no external docker-compose required.
//!
//! # Running
//! ```bash
//! cargo test --test integration -- --ignored --nocapture
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use memo_engine::remote::RedisRemoteStore;
use memo_engine::{
    CacheConfig, CacheRegistry, EngineState, MemoEngine, MemoEngineConfig, RemoteEndpoints,
    RemoteStore,
};

use testcontainers::{clients::Cli, core::WaitFor, Container, GenericImage};

// =============================================================================
// Container Helpers
// =============================================================================

/// Create a Redis container with health check
fn redis_container(docker: &Cli) -> Container<'_, GenericImage> {
    let image = GenericImage::new("redis", "7-alpine")
        .with_exposed_port(6379)
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"));
    docker.run(image)
}

fn config_for(port: u16) -> MemoEngineConfig {
    MemoEngineConfig {
        redis_url: Some(format!("redis://127.0.0.1:{}", port)),
        redis_prefix: Some("memo-test:".into()),
        remote_timeout_ms: 500,
        health_check_interval_ms: 100,
        ..Default::default()
    }
}

// =============================================================================
// Happy Path
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_values_shared_through_redis() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let config = config_for(redis.get_host_port_ipv4(6379));

    let endpoints = RemoteEndpoints::connect(&config)
        .await
        .expect("Should connect to Redis")
        .expect("Redis url is configured");

    let mut first = CacheRegistry::builder(config.clone(), Some(endpoints.clone()));
    let writer = first
        .register(CacheConfig::new("Dept.heads").remote(true), |dept: String| async move {
            Ok::<_, String>(BTreeMap::from([(1u32, format!("{dept}-head"))]))
        })
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut second = CacheRegistry::builder(config, Some(endpoints.clone()));
    let reader = second
        .register(CacheConfig::new("Dept.heads").remote(true), move |_: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<BTreeMap<u32, String>, String>(BTreeMap::new())
            }
        })
        .unwrap();

    let written = writer.call("eng".into()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(reader.call("eng".into()).await.unwrap(), written);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // Key carries prefix and cache name
    let raw = endpoints.reader().get("Dept.heads::\"eng\"").await.unwrap();
    assert!(raw.is_some());
}

#[tokio::test]
#[ignore] // Requires Docker
async fn happy_remote_entries_expire_with_ttl() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let port = redis.get_host_port_ipv4(6379);

    let store = RedisRemoteStore::with_prefix("primary", &format!("redis://127.0.0.1:{}", port), Some("memo-test:"))
        .await
        .expect("Should connect to Redis");

    store.set_with_ttl("ephemeral", b"1", Duration::from_millis(200)).await.unwrap();
    assert_eq!(store.get("ephemeral").await.unwrap(), Some(b"1".to_vec()));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.get("ephemeral").await.unwrap(), None);
    assert!(store.ping().await.unwrap());
}

// =============================================================================
// Failure Scenarios
// =============================================================================

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_unavailable_at_startup() {
    let config = MemoEngineConfig {
        redis_url: Some("redis://127.0.0.1:59999".to_string()), // Non-existent
        remote_timeout_ms: 200,
        ..Default::default()
    };

    let endpoints = tokio::time::timeout(Duration::from_secs(15), RemoteEndpoints::connect(&config))
        .await
        .expect("Startup retries should give up")
        .expect("An unreachable store is not a startup error")
        .expect("Redis url is configured");
    assert!(!endpoints.reachable_at_startup());

    let mut builder = CacheRegistry::builder(config, Some(endpoints));
    let op = builder
        .register(CacheConfig::new("Cube.of").remote(true), |n: u64| async move {
            Ok::<_, String>(n * n * n)
        })
        .unwrap();
    let engine = MemoEngine::start(builder.build());
    assert!(!engine.health().is_available());

    // Served from the origin and the local tier only
    assert_eq!(op.call(3).await, Ok(27));
    assert_eq!(op.call(3).await, Ok(27));
    assert_eq!(op.stats().origin_calls, 1);

    engine.shutdown().await;
}

#[tokio::test]
#[ignore] // Requires Docker
async fn failure_redis_dies_mid_operation() {
    let docker = Cli::default();
    let redis = redis_container(&docker);
    let config = config_for(redis.get_host_port_ipv4(6379));
    let endpoints = RemoteEndpoints::connect(&config).await.unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut builder = CacheRegistry::builder(config, endpoints);
    let op = builder
        .register(CacheConfig::new("Cube.of").remote(true), move |n: u64| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(n * n * n)
            }
        })
        .unwrap();
    let engine = MemoEngine::start(builder.build());

    for n in 0..5 {
        assert_eq!(op.call(n).await, Ok(n * n * n));
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Kill Redis!
    drop(redis);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!engine.health().is_available());

    // Cached and fresh values keep flowing without errors
    for n in 0..10 {
        assert_eq!(op.call(n).await, Ok(n * n * n));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 10);

    tokio::time::timeout(Duration::from_secs(5), engine.shutdown())
        .await
        .expect("Shutdown should not hang on a dead Redis");
    assert_eq!(engine.state(), EngineState::Stopped);
}
