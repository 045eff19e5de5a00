//! In-process expiring cache with memcached `add`/`incr` semantics.

use super::{AtomicCacheStore, CacheStore};
use crate::clock::{Clock, SystemClock};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at_millis: i64,
}

type Entries = HashMap<String, Entry>;

/// Simple in-memory cache. Clones share the same entries.
///
/// Expired entries are dropped lazily on access.
#[derive(Clone, Debug)]
pub struct InMemoryCache {
    entries: Arc<Mutex<Entries>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Use `clock` to decide expiry (share it with the limiter in tests).
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        Self { entries: Arc::new(Mutex::new(HashMap::new())), clock: Arc::new(clock) }
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.now_millis();
        self.entries
            .lock()
            .map(|entries| entries.values().filter(|e| e.expires_at_millis > now).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let now = self.now_millis();
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, e)| e.expires_at_millis > now)
                    .map(|(k, _)| k.clone())
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        keys
    }

    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        let ttl = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        self.now_millis().saturating_add(ttl)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, BackendError> {
        self.entries.lock().map_err(|_| BackendError::unavailable("in-memory cache lock poisoned"))
    }

    fn live(entries: &mut Entries, key: &str, now: i64) -> Option<u64> {
        match entries.get(key) {
            Some(e) if e.expires_at_millis > now => Some(e.value),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<u64>, BackendError> {
        let now = self.now_millis();
        let mut entries = self.lock()?;
        Ok(Self::live(&mut entries, key, now))
    }

    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, u64>, BackendError> {
        let now = self.now_millis();
        let mut entries = self.lock()?;
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = Self::live(&mut entries, key, now) {
                found.insert(key.clone(), value);
            }
        }
        Ok(found)
    }

    async fn set(&self, key: &str, value: u64, ttl: Duration) -> Result<(), BackendError> {
        let expires_at_millis = self.expiry(ttl);
        self.lock()?.insert(key.to_string(), Entry { value, expires_at_millis });
        Ok(())
    }
}

#[async_trait]
impl AtomicCacheStore for InMemoryCache {
    async fn add(&self, key: &str, value: u64, ttl: Duration) -> Result<bool, BackendError> {
        let now = self.now_millis();
        let expires_at_millis = self.expiry(ttl);
        let mut entries = self.lock()?;
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry { value, expires_at_millis });
        Ok(true)
    }

    async fn incr(&self, key: &str, delta: u64) -> Result<Option<u64>, BackendError> {
        let now = self.now_millis();
        let mut entries = self.lock()?;
        if Self::live(&mut entries, key, now).is_none() {
            return Ok(None);
        }
        Ok(entries.get_mut(key).map(|entry| {
            entry.value = entry.value.saturating_add(delta);
            entry.value
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn cache() -> (InMemoryCache, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        (InMemoryCache::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn add_only_stores_when_absent() {
        let (cache, _) = cache();
        assert!(cache.add("k", 0, Duration::from_secs(60)).await.unwrap());
        assert!(!cache.add("k", 7, Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn add_replaces_expired_entry() {
        let (cache, clock) = cache();
        cache.set("k", 9, Duration::from_secs(60)).await.unwrap();
        clock.advance(chrono::Duration::seconds(61));

        assert!(cache.add("k", 1, Duration::from_secs(60)).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn incr_on_missing_key_reports_none() {
        let (cache, _) = cache();
        assert_eq!(cache.incr("missing", 1).await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn incr_returns_new_value() {
        let (cache, _) = cache();
        cache.set("k", 41, Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.incr("k", 1).await.unwrap(), Some(42));
    }

    #[tokio::test]
    async fn len_and_keys_skip_expired() {
        let (cache, clock) = cache();
        cache.set("b", 1, Duration::from_secs(30)).await.unwrap();
        cache.set("a", 1, Duration::from_secs(90)).await.unwrap();
        assert_eq!(cache.keys(), vec!["a".to_string(), "b".to_string()]);

        clock.advance(chrono::Duration::seconds(45));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.keys(), vec!["a".to_string()]);
    }
}
