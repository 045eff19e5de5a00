//! Cache backend adapters.
//!
//! The limiter core talks to a [`CounterBackend`]: a multi-get and an increment with
//! expiry. Two adapters provide it over a shared cache, chosen explicitly at
//! construction:
//!
//! - [`AtomicCounter`] for stores with memcached-style `add`/`incr`
//!   ([`AtomicCacheStore`]). Increments are race-free.
//! - [`ReadModifyWriteCounter`] for plain get/set stores ([`CacheStore`]). Increments
//!   are a non-atomic read-modify-write: concurrent requests hitting the same bucket
//!   can overwrite each other and undercount.
//!
//! In both cases the read-then-decide step of the limiter is not atomic as a whole, so
//! the effective limit can be exceeded by a small margin under concurrent load.

use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub mod memory;
pub use memory::InMemoryCache;

/// Counter operations the rate limiter needs from a cache.
#[async_trait]
pub trait CounterBackend: Send + Sync {
    /// Fetch the counters that exist among `keys`. Missing keys are absent from the
    /// result, not zero-filled.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError>;

    /// Add one to the counter at `key`, creating it with value 1 and the given expiry
    /// if absent.
    async fn increment(&self, key: &str, expire_after: Duration) -> Result<(), BackendError>;
}

#[async_trait]
impl<T> CounterBackend for Arc<T>
where
    T: CounterBackend + ?Sized,
{
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError> {
        (**self).get_many(keys).await
    }

    async fn increment(&self, key: &str, expire_after: Duration) -> Result<(), BackendError> {
        (**self).increment(key, expire_after).await
    }
}

/// A shared key-value store holding integer values with a time to live.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<u64>, BackendError>;

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError>;

    /// Unconditionally store `value`, expiring after `ttl`.
    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), BackendError>;
}

/// A [`CacheStore`] with memcached-style atomic primitives.
#[async_trait]
pub trait AtomicCacheStore: CacheStore {
    /// Store `value` only if `key` is absent. Returns whether it was stored.
    async fn add(&self, key: &str, value: u64, ttl: Duration) -> Result<bool, BackendError>;

    /// Atomically add `delta` to an existing counter, keeping its expiry. Returns the
    /// new value, or `None` when the key does not exist.
    async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, BackendError>;
}

/// Atomic adapter: `add(key, 0)` to make sure the counter exists with the target
/// expiry, then `incr(key, 1)`.
#[derive(Debug, Clone)]
pub struct AtomicCounter<C> {
    cache: C,
}

impl<C> AtomicCounter<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    /// Borrow the wrapped store.
    pub fn cache(&self) -> &C {
        &self.cache
    }
}

#[async_trait]
impl<C> CounterBackend for AtomicCounter<C>
where
    C: AtomicCacheStore,
{
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError> {
        self.cache.get_many(keys).await
    }

    async fn increment(&self, key: &str, expire_after: Duration) -> Result<(), BackendError> {
        self.cache.add(key, 0, expire_after).await?;
        if self.cache.incr(key, 1).await?.is_none() {
            // Evicted or expired between add and incr.
            tracing::debug!(key, "counter vanished before incr, re-adding");
            self.cache.add(key, 1, expire_after).await?;
        }
        Ok(())
    }
}

/// Fallback adapter for stores without atomic increment.
///
/// Reads the current value (0 if absent), adds one and writes it back with a fresh
/// expiry. Two concurrent increments of the same key can both read `n` and both write
/// `n + 1`, losing one request.
#[derive(Debug, Clone)]
pub struct ReadModifyWriteCounter<C> {
    cache: C,
}

impl<C> ReadModifyWriteCounter<C> {
    pub fn new(cache: C) -> Self {
        Self { cache }
    }

    /// Borrow the wrapped store.
    pub fn cache(&self) -> &C {
        &self.cache
    }
}

#[async_trait]
impl<C> CounterBackend for ReadModifyWriteCounter<C>
where
    C: CacheStore,
{
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError> {
        self.cache.get_many(keys).await
    }

    async fn increment(&self, key: &str, expire_after: Duration) -> Result<(), BackendError> {
        let current = self.cache.get(key).await?.unwrap_or(0);
        self.cache.set(key, current.saturating_add(1), expire_after).await
    }
}
