use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::traits::RemoteStore;
use crate::error::RemoteError;

struct StoredValue {
    bytes: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-process stand-in for the remote store.
///
/// Shares the Redis semantics the bridge relies on (byte values, per-key
/// expiry) and can be switched unreachable to simulate an outage.
pub struct InMemoryRemoteStore {
    label: String,
    data: DashMap<String, StoredValue>,
    reachable: AtomicBool,
    calls: AtomicU64,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            data: DashMap::new(),
            reachable: AtomicBool::new(true),
            calls: AtomicU64::new(0),
        }
    }

    /// Simulate the store going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Total calls of any kind received, including failed ones.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Get current live key count
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.iter().filter(|e| e.value().is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live value exists, without counting as a call.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.data
            .get(key)
            .is_some_and(|v| v.value().is_live(Instant::now()))
    }

    /// Store bytes directly, bypassing the call counter (fixtures, corruption tests).
    pub fn insert_raw(&self, key: &str, bytes: Vec<u8>) {
        self.data.insert(
            key.to_string(),
            StoredValue { bytes, expires_at: None },
        );
    }

    /// Clear all keys
    pub fn clear(&self) {
        self.data.clear();
    }

    fn enter(&self) -> Result<(), RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Connection(format!("{} is unreachable", self.label)))
        }
    }
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new("memory")
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    fn label(&self) -> &str {
        &self.label
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        self.enter()?;
        let now = Instant::now();
        let live = self
            .data
            .get(key)
            .filter(|v| v.value().is_live(now))
            .map(|v| v.value().bytes.clone());
        if live.is_none() {
            self.data.remove_if(key, |_, v| !v.is_live(now));
        }
        Ok(live)
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), RemoteError> {
        self.enter()?;
        self.data.insert(
            key.to_string(),
            StoredValue { bytes: value.to_vec(), expires_at: None },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), RemoteError> {
        self.enter()?;
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<bool, RemoteError> {
        self.enter()?;
        Ok(true)
    }
}
