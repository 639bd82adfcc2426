//! The cached form of a registered operation.
//!
//! [`CachedOperation::call`] runs the lookup protocol:
//!
//! ```text
//! local hit ──────────────────────────────────────────────► value
//! local miss ─► remote hit (store available) ─► local put ─► value
//!           └─► origin ─► Ok(absent) ──────────────────────► value
//!                      ├► Ok(v) ─► local put, spawned remote write ─► v
//!                      └► Err(e) ──────────────────────────► Err(e)
//! ```
//!
//! Remote trouble never reaches the caller; origin errors reach it
//! unchanged and are never cached.

use parking_lot::Mutex;
use std::fmt::{self, Display};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::CachePolicy;
use crate::error::ReloadFailure;
use crate::key::CacheArgs;
use crate::local::LocalTier;
use crate::metrics::LatencyTimer;
use crate::reload::{refresh_lead, ReloadFuture, Reloadable};
use crate::remote::RemoteChannel;
use crate::shape::CacheValue;
use crate::stats::{CacheStats, LocalStats};

pub(crate) type OriginFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;
pub(crate) type Origin<A, T, E> = Arc<dyn Fn(A) -> OriginFuture<T, E> + Send + Sync>;

struct Inner<A, T: CacheValue, E> {
    policy: CachePolicy,
    local: LocalTier<T>,
    remote: Option<Arc<RemoteChannel<T>>>,
    origin: Origin<A, T, E>,
    origin_calls: AtomicU64,
    /// Expiry of the held value; tracked for auto-reload caches only
    expires_at: Mutex<Option<Instant>>,
}

/// Handle to a registered cache. Cheap to clone; clones share the tiers.
pub struct CachedOperation<A, T: CacheValue, E> {
    inner: Arc<Inner<A, T, E>>,
    _args: PhantomData<fn(A)>,
}

impl<A, T: CacheValue, E> Clone for CachedOperation<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _args: PhantomData,
        }
    }
}

impl<A, T: CacheValue, E> fmt::Debug for CachedOperation<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedOperation")
            .field("cache", &self.inner.policy.name)
            .field("remote", &self.inner.remote.is_some())
            .finish_non_exhaustive()
    }
}

impl<A, T, E> CachedOperation<A, T, E>
where
    A: CacheArgs,
    T: CacheValue,
    E: Display + Send + 'static,
{
    pub(crate) fn new(
        policy: CachePolicy,
        local: LocalTier<T>,
        remote: Option<RemoteChannel<T>>,
        origin: Origin<A, T, E>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                policy,
                local,
                remote: remote.map(Arc::new),
                origin,
                origin_calls: AtomicU64::new(0),
                expires_at: Mutex::new(None),
            }),
            _args: PhantomData,
        }
    }

    /// Look the arguments up in both tiers, invoking the origin on a full miss.
    pub async fn call(&self, args: A) -> Result<T, E> {
        let inner = &self.inner;
        let key = args.cache_key();

        if let Some(value) = inner.local.get(&key) {
            crate::metrics::record_request(&inner.policy.name, "local", "hit");
            debug!(cache = %inner.policy.name, key = %key, "Local hit");
            return Ok(value);
        }
        crate::metrics::record_request(&inner.policy.name, "local", "miss");

        if let Some(ref remote) = inner.remote {
            if let Some(value) = remote.read(&key).await {
                self.put_local(key, value.clone());
                return Ok(value);
            }
        }

        debug!(cache = %inner.policy.name, key = %key, "Cache miss, invoking origin");
        let value = self.invoke_origin(args).await?;
        self.store(key, &value);
        Ok(value)
    }

    /// Adapt this operation into a plain async function.
    pub fn wrap(&self) -> impl Fn(A) -> Pin<Box<dyn Future<Output = Result<T, E>> + Send>> + Clone {
        let op = self.clone();
        move |args| {
            let op = op.clone();
            Box::pin(async move { op.call(args).await })
        }
    }

    /// Drop the local entry for `args`. The remote copy lives until its ttl.
    pub fn invalidate(&self, args: &A) {
        self.inner.expires_at.lock().take();
        self.inner.local.invalidate(&args.cache_key());
    }

    pub fn invalidate_all(&self) {
        self.inner.expires_at.lock().take();
        self.inner.local.invalidate_all();
    }

    #[must_use]
    pub fn policy(&self) -> &CachePolicy {
        &self.inner.policy
    }

    #[must_use]
    pub fn local_stats(&self) -> LocalStats {
        self.inner.local.stats()
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            name: self.inner.policy.name.clone(),
            local: self.inner.local.stats(),
            remote: self.inner.remote.as_ref().map(|r| r.stats()),
            origin_calls: self.inner.origin_calls.load(Ordering::Relaxed),
        }
    }

    /// Whether this cache reads and writes the remote tier.
    #[must_use]
    pub fn has_remote_tier(&self) -> bool {
        self.inner.remote.is_some()
    }

    async fn invoke_origin(&self, args: A) -> Result<T, E> {
        let inner = &self.inner;
        inner.origin_calls.fetch_add(1, Ordering::Relaxed);

        let result = {
            let _timer = LatencyTimer::new(&inner.policy.name, "origin");
            (inner.origin)(args).await
        };
        let status = match result {
            Ok(ref v) if v.is_absent() => "absent",
            Ok(_) => "success",
            Err(_) => "error",
        };
        crate::metrics::record_origin_call(&inner.policy.name, status);
        result
    }

    /// Absent results are not cached anywhere.
    fn store(&self, key: String, value: &T) {
        let inner = &self.inner;
        if value.is_absent() {
            debug!(cache = %inner.policy.name, key = %key, "Absent result, not cached");
            return;
        }
        self.put_local(key.clone(), value.clone());

        let Some(ref remote) = inner.remote else {
            return;
        };
        if !remote.is_available() {
            return;
        }
        let remote = Arc::clone(remote);
        let value = value.clone();
        let ttl = inner.policy.ttl;
        tokio::spawn(async move {
            remote.write(&key, &value, ttl).await;
        });
    }

    /// The deadline is recorded before the insert so it never trails the
    /// local tier's own expiry.
    fn put_local(&self, key: String, value: T) {
        let inner = &self.inner;
        if inner.policy.auto_reload {
            *inner.expires_at.lock() = Some(Instant::now() + inner.policy.ttl);
        }
        inner.local.put(key, value);
    }
}

impl<A, T, E> Reloadable for CachedOperation<A, T, E>
where
    A: CacheArgs,
    T: CacheValue,
    E: Display + Send + 'static,
{
    fn name(&self) -> &str {
        &self.inner.policy.name
    }

    fn ttl(&self) -> Duration {
        self.inner.policy.ttl
    }

    /// A reload clears the deadline; only a stored result sets a new one.
    fn reload(&self) -> ReloadFuture {
        self.inner.expires_at.lock().take();
        let op = self.clone();
        Box::pin(async move {
            let cache = op.inner.policy.name.clone();
            let Some(args) = A::unit() else {
                return Err(ReloadFailure { cache, reason: "operation takes arguments".into() });
            };
            let key = args.cache_key();
            match op.invoke_origin(args).await {
                Ok(value) => {
                    op.store(key, &value);
                    crate::metrics::record_reload(&cache, "success");
                    debug!(cache = %cache, "Reloaded");
                    Ok(())
                }
                Err(e) => {
                    crate::metrics::record_reload(&cache, "error");
                    Err(ReloadFailure { cache, reason: e.to_string() })
                }
            }
        })
    }

    fn warm_up(&self) -> ReloadFuture {
        let op = self.clone();
        Box::pin(async move {
            let cache = op.inner.policy.name.clone();
            let Some(args) = A::unit() else {
                return Err(ReloadFailure { cache, reason: "operation takes arguments".into() });
            };
            op.call(args)
                .await
                .map(|_| ())
                .map_err(|e| ReloadFailure { cache, reason: e.to_string() })
        })
    }

    fn refresh_due(&self) -> Option<Instant> {
        let expires_at = (*self.inner.expires_at.lock())?;
        let lead = refresh_lead(self.inner.policy.ttl);
        Some(expires_at.checked_sub(lead).unwrap_or(expires_at))
    }

    fn run_maintenance(&self) {
        self.inner.local.run_pending_tasks();
    }
}
