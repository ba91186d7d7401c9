//! In-process LRU-backed cache backend.
//!
//! Capacity-bounded at 1000 keys. Reads use `peek()` only, never `get()`,
//! so a read never reorders the map — eviction stays oldest-insertion-first
//! rather than the `lru` crate's usual recency-based order, matching §4.4's
//! exact contract that reads must not extend a key's lifetime.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

use super::{validate_body, CacheAdapter, CacheStats, Snapshot};

const DEFAULT_CAPACITY: usize = 1000;

pub struct LocalCache {
    inner: Mutex<LruCache<Fingerprint, Snapshot>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl LocalCache {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }
}

impl Default for LocalCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheAdapter for LocalCache {
    async fn get(&self, key: &Fingerprint) -> Result<Option<Snapshot>, CacheError> {
        let found = self.inner.lock().peek(key).cloned();
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(found)
    }

    async fn set(&self, key: &Fingerprint, snapshot: Snapshot) -> Result<(), CacheError> {
        validate_body(&snapshot.body)?;
        self.inner.lock().put(key.clone(), snapshot);
        Ok(())
    }

    async fn delete(&self, key: &Fingerprint) -> Result<(), CacheError> {
        self.inner.lock().pop(key);
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.inner.lock().clear();
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Fingerprint>, CacheError> {
        Ok(self.inner.lock().iter().map(|(k, _)| k.clone()).collect())
    }

    async fn entries(&self) -> Result<Vec<(Fingerprint, Snapshot)>, CacheError> {
        Ok(self
            .inner
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let key_count = inner.len() as u64;
        let byte_size = inner.iter().map(|(_, v)| v.body.len() as u64).sum();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            key_count,
            byte_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    fn snapshot() -> Snapshot {
        Snapshot {
            body: "<html></html>".to_string(),
            status: 200,
            rendered_at: SystemTime::now(),
            ttl: Duration::from_secs(3600),
        }
    }

    fn key(s: &str) -> Fingerprint {
        Fingerprint::from(s.to_string())
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = LocalCache::new();
        cache.set(&key("a"), snapshot()).await.unwrap();
        let got = cache.get(&key("a")).await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn eviction_is_oldest_insertion_first_not_recency_based() {
        let cache = LocalCache::with_capacity(2);
        cache.set(&key("a"), snapshot()).await.unwrap();
        cache.set(&key("b"), snapshot()).await.unwrap();

        // Reading "a" via peek() must NOT protect it from eviction.
        let _ = cache.get(&key("a")).await.unwrap();

        cache.set(&key("c"), snapshot()).await.unwrap();

        assert!(cache.get(&key("a")).await.unwrap().is_none());
        assert!(cache.get(&key("b")).await.unwrap().is_some());
        assert!(cache.get(&key("c")).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = LocalCache::new();
        cache.set(&key("a"), snapshot()).await.unwrap();
        cache.delete(&key("a")).await.unwrap();
        assert!(cache.get(&key("a")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_empty_body() {
        let cache = LocalCache::new();
        let mut s = snapshot();
        s.body.clear();
        assert!(cache.set(&key("a"), s).await.is_err());
    }
}
