//! # Cache Layer
//!
//! Key-value cache in front of the store of record, plus the typed
//! [`CacheAside`] helper the ledger and projector share.
//!
//! ## Read / Write Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cache-Aside                                          │
//! │                                                                         │
//! │  READ                                WRITE                             │
//! │  ────                                ─────                             │
//! │  GET prefix:id                       store write  (must succeed first) │
//! │    ├── hit, decodes  → return          │                               │
//! │    ├── tombstone     → miss            ▼                               │
//! │    ├── hit, garbage  → DEL, fall thru  SET prefix:id EX ttl            │
//! │    └── miss / error  → store read        │   (delete: SET tombstone)   │
//! │                          │               └── fails → DEL               │
//! │                          ▼                    └── fails →              │
//! │                     SET NX (fill)           background DEL retry       │
//! │                                             (exponential backoff)      │
//! │                                                                         │
//! │  Cache failures are logged, never returned to the caller.              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A miss fill uses `SET NX` so a slow reader cannot overwrite a value a
//! concurrent writer just stored. Invalidation leaves a short-lived
//! [`TOMBSTONE`] rather than an empty key, so the same slow reader cannot
//! bring back a row that was deleted while it was reading.

pub mod memory;
pub mod redis;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

/// Value left behind by [`CacheAside::invalidate`]. Never valid JSON.
pub const TOMBSTONE: &str = "~tombstone";

// =============================================================================
// Errors
// =============================================================================

/// Cache operation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The cache server could not be reached or rejected the command.
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// The operation did not finish within the cache op timeout.
    #[error("Cache operation timed out")]
    Timeout,

    /// A payload could not be encoded or decoded.
    #[error("Cache payload error: {0}")]
    Serialization(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

// =============================================================================
// Cache Trait
// =============================================================================

/// Minimal key-value surface: `GET`, `SET key value ttl`, `SET NX`, `DEL`.
#[async_trait]
pub trait Cache: Send + Sync {
    /// `Ok(None)` is a miss, distinct from an error.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    /// Stores `value` only when `key` is absent. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<bool>;

    /// Removes `key`. Removing an absent key succeeds.
    async fn del(&self, key: &str) -> CacheResult<()>;
}

// =============================================================================
// Settings
// =============================================================================

/// Tunables shared by every [`CacheAside`] instance.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Entry time-to-live.
    /// Default: 7 days
    pub ttl: Duration,

    /// Upper bound for a single cache round trip.
    /// Default: 250ms
    pub op_timeout: Duration,

    /// First delay of the background invalidation retry.
    /// Default: 100ms
    pub repair_initial_interval: Duration,

    /// Give up on background invalidation after this long.
    /// Default: 5 minutes
    pub repair_max_elapsed: Duration,

    /// Lifetime of an invalidation tombstone; must outlast any in-flight
    /// store read.
    /// Default: 60 seconds
    pub tombstone_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        CacheSettings {
            ttl: Duration::from_secs(stockline_core::DEFAULT_CACHE_TTL_SECS),
            op_timeout: Duration::from_millis(250),
            repair_initial_interval: Duration::from_millis(100),
            repair_max_elapsed: Duration::from_secs(300),
            tombstone_ttl: Duration::from_secs(60),
        }
    }
}

impl CacheSettings {
    /// Sets the entry time-to-live.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the per-operation timeout.
    pub fn op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Sets the invalidation tombstone lifetime.
    pub fn tombstone_ttl(mut self, ttl: Duration) -> Self {
        self.tombstone_ttl = ttl;
        self
    }

    /// Sets the background repair schedule.
    pub fn repair(mut self, initial_interval: Duration, max_elapsed: Duration) -> Self {
        self.repair_initial_interval = initial_interval;
        self.repair_max_elapsed = max_elapsed;
        self
    }

    fn repair_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.repair_initial_interval,
            max_interval: self.repair_initial_interval.saturating_mul(32),
            multiplier: 2.0,
            max_elapsed_time: Some(self.repair_max_elapsed),
            ..Default::default()
        }
    }
}

// =============================================================================
// Typed Cache-Aside Helper
// =============================================================================

/// Typed, namespaced view of a [`Cache`] for one record type.
///
/// Every method swallows cache errors after logging them.
pub struct CacheAside<T> {
    cache: Arc<dyn Cache>,
    namespace: &'static str,
    settings: CacheSettings,
    _record: PhantomData<fn() -> T>,
}

impl<T> Clone for CacheAside<T> {
    fn clone(&self) -> Self {
        CacheAside {
            cache: Arc::clone(&self.cache),
            namespace: self.namespace,
            settings: self.settings.clone(),
            _record: PhantomData,
        }
    }
}

impl<T> CacheAside<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(cache: Arc<dyn Cache>, namespace: &'static str, settings: CacheSettings) -> Self {
        CacheAside {
            cache,
            namespace,
            settings,
            _record: PhantomData,
        }
    }

    /// `namespace:id`
    pub fn key(&self, id: Uuid) -> String {
        format!("{}:{}", self.namespace, id)
    }

    async fn bounded<R>(&self, op: impl Future<Output = CacheResult<R>>) -> CacheResult<R> {
        tokio::time::timeout(self.settings.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout)?
    }

    /// Cached value for `id`, or `None` on a miss, a tombstone, an error or an
    /// undecodable entry.
    pub async fn get(&self, id: Uuid) -> Option<T> {
        let key = self.key(id);

        let raw = match self.bounded(self.cache.get(&key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "Cache read failed, falling back to store");
                return None;
            }
        };

        if raw == TOMBSTONE {
            debug!(%key, "Cache tombstone");
            return None;
        }

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(%key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(%key, error = %e, "Discarding undecodable cache entry");
                self.remove(key).await;
                None
            }
        }
    }

    /// Write-through after a successful store write.
    ///
    /// A failed `SET` falls back to invalidation so the old entry cannot
    /// outlive the write.
    pub async fn put(&self, id: Uuid, value: &T) {
        let key = self.key(id);

        let result = match encode(value) {
            Ok(raw) => self.bounded(self.cache.set(&key, &raw, self.settings.ttl)).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            warn!(%key, error = %e, "Cache write failed, invalidating");
            self.invalidate(id).await;
        }
    }

    /// Populates a miss from the store, unless a writer got there first.
    pub async fn fill(&self, id: Uuid, value: &T) {
        let key = self.key(id);

        let result = match encode(value) {
            Ok(raw) => {
                self.bounded(self.cache.set_if_absent(&key, &raw, self.settings.ttl))
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(stored) => debug!(%key, stored, "Cache fill"),
            Err(e) => warn!(%key, error = %e, "Cache fill failed"),
        }
    }

    /// Replaces the entry with a [`TOMBSTONE`] that blocks fills until it
    /// expires. Falls back to a plain delete when the tombstone cannot be
    /// written.
    pub async fn invalidate(&self, id: Uuid) {
        let key = self.key(id);

        match self
            .bounded(self.cache.set(&key, TOMBSTONE, self.settings.tombstone_ttl))
            .await
        {
            Ok(()) => debug!(%key, "Cache entry tombstoned"),
            Err(e) => {
                warn!(%key, error = %e, "Cache tombstone failed, deleting");
                self.remove(key).await;
            }
        }
    }

    /// Deletes the key; on failure a background task keeps retrying.
    async fn remove(&self, key: String) {
        if let Err(e) = self.bounded(self.cache.del(&key)).await {
            warn!(%key, error = %e, "Cache invalidation failed, scheduling repair");
            self.spawn_repair(key);
        }
    }

    fn spawn_repair(&self, key: String) {
        let cache = Arc::clone(&self.cache);
        let op_timeout = self.settings.op_timeout;
        let policy = self.settings.repair_backoff();

        tokio::spawn(async move {
            let outcome = backoff::future::retry(policy, || {
                let cache = Arc::clone(&cache);
                let key = key.clone();
                async move {
                    match tokio::time::timeout(op_timeout, cache.del(&key)).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(backoff::Error::transient(e)),
                        Err(_) => Err(backoff::Error::transient(CacheError::Timeout)),
                    }
                }
            })
            .await;

            match outcome {
                Ok(()) => debug!(%key, "Cache repair succeeded"),
                Err(e) => warn!(%key, error = %e, "Cache repair gave up; entry expires by TTL"),
            }
        });
    }
}

fn encode<T: Serialize>(value: &T) -> CacheResult<String> {
    serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))
}
