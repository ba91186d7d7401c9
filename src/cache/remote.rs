//! Redis-backed cache backend.
//!
//! Grounded on `Govcraft-acton-service`'s `deadpool-redis` usage: a pool is
//! created eagerly but connections are established lazily, so a backend
//! that's still coming up reports `CacheError::NotReady` rather than
//! blocking the request path. Stats (`keys`/`entries`) continue serving
//! their last-known-good snapshot through a `parking_lot::Mutex`-guarded
//! cache while a reconnect is in flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{redis::{pipe, AsyncCommands}, Config, Pool, Runtime};
use tracing::warn;

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

use super::{validate_body, CacheAdapter, CacheStats, Snapshot};

const KEY_PREFIX: &str = "seo-shield:";
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Extra time a key survives in Redis past its nominal TTL, so
/// `getWithFreshness` can still return an `Expired`-adjacent entry long
/// enough for one background SWR refill to complete (§4.4(b)).
const EXPIRY_GRACE: Duration = Duration::from_secs(120);

pub struct RemoteCache {
    pool: Pool,
    ready: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    /// Last-known-good stats, served while the pool is reconnecting so
    /// `stats()` never blocks on a live connection (§4.4 backend contract).
    last_known_key_count: AtomicU64,
    last_known_byte_size: AtomicU64,
}

impl RemoteCache {
    /// # Errors
    /// Returns a `CacheError::Backend` if the pool configuration itself is
    /// invalid (malformed URL). Connection failures surface later, per-call,
    /// as `CacheError::NotReady`.
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(Self {
            pool,
            ready: AtomicBool::new(false),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            last_known_key_count: AtomicU64::new(0),
            last_known_byte_size: AtomicU64::new(0),
        })
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection, CacheError> {
        match self.pool.get().await {
            Ok(conn) => {
                self.ready.store(true, Ordering::Relaxed);
                Ok(conn)
            }
            Err(e) => {
                if self.ready.swap(false, Ordering::Relaxed) {
                    warn!(error = %e, "lost connection to remote cache backend, entering backoff");
                }
                Err(CacheError::NotReady)
            }
        }
    }

    fn namespaced(key: &Fingerprint) -> String {
        format!("{KEY_PREFIX}{key}")
    }

    /// Best-effort key-count/byte-size refresh after a write. Failures are
    /// swallowed: `stats()` simply keeps serving the previous known-good
    /// values, per the backend's "not ready" contract.
    ///
    /// The per-key `STRLEN` calls are batched into a single pipelined round
    /// trip rather than issued one at a time, so this stays cheap as the
    /// key count grows instead of adding N sequential round trips to the
    /// request path that calls `set`/`delete`.
    async fn refresh_size_stats(&self) {
        let Ok(mut conn) = self.connection().await else {
            return;
        };
        let Ok(keys) = conn
            .keys::<_, Vec<String>>(format!("{KEY_PREFIX}*"))
            .await
        else {
            return;
        };
        self.last_known_key_count
            .store(keys.len() as u64, Ordering::Relaxed);

        if keys.is_empty() {
            self.last_known_byte_size.store(0, Ordering::Relaxed);
            return;
        }

        let mut pipeline = pipe();
        for key in &keys {
            pipeline.strlen(key);
        }
        let Ok(lens) = pipeline.query_async::<Vec<usize>>(&mut conn).await else {
            return;
        };
        let byte_size: u64 = lens.into_iter().map(|len| len as u64).sum();
        self.last_known_byte_size.store(byte_size, Ordering::Relaxed);
    }
}

#[async_trait]
impl CacheAdapter for RemoteCache {
    async fn get(&self, key: &Fingerprint) -> Result<Option<Snapshot>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .get(Self::namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        let result = match raw {
            None => Ok(None),
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| CacheError::Backend(e.to_string())),
        };
        match &result {
            Ok(Some(_)) => self.hits.fetch_add(1, Ordering::Relaxed),
            _ => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        result
    }

    async fn set(&self, key: &Fingerprint, snapshot: Snapshot) -> Result<(), CacheError> {
        validate_body(&snapshot.body)?;
        let mut conn = self.connection().await?;
        let json = serde_json::to_string(&snapshot).map_err(|e| CacheError::Backend(e.to_string()))?;
        let ttl_secs = (snapshot.ttl + EXPIRY_GRACE).as_secs().max(1);
        let _: () = conn
            .set_ex(Self::namespaced(key), json, ttl_secs)
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        self.refresh_size_stats().await;
        Ok(())
    }

    async fn delete(&self, key: &Fingerprint) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(Self::namespaced(key))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        self.refresh_size_stats().await;
        Ok(())
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(format!("{KEY_PREFIX}*"))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        if !keys.is_empty() {
            let _: () = conn
                .del(keys)
                .await
                .map_err(|e| CacheError::Backend(e.to_string()))?;
        }
        self.last_known_key_count.store(0, Ordering::Relaxed);
        self.last_known_byte_size.store(0, Ordering::Relaxed);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<Fingerprint>, CacheError> {
        let mut conn = self.connection().await?;
        let raw: Vec<String> = conn
            .keys(format!("{KEY_PREFIX}*"))
            .await
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        Ok(raw
            .into_iter()
            .filter_map(|k| k.strip_prefix(KEY_PREFIX).map(|s| Fingerprint::from(s.to_string())))
            .collect())
    }

    async fn entries(&self) -> Result<Vec<(Fingerprint, Snapshot)>, CacheError> {
        let keys = self.keys().await?;
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(snapshot) = self.get(&key).await? {
                out.push((key, snapshot));
            }
        }
        Ok(out)
    }

    fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            key_count: self.last_known_key_count.load(Ordering::Relaxed),
            byte_size: self.last_known_byte_size.load(Ordering::Relaxed),
        }
    }
}

/// Background task retrying the initial connection on `RECONNECT_BACKOFF`
/// intervals until the pool reports healthy, logging the transition once.
pub async fn wait_until_ready(cache: &RemoteCache) {
    loop {
        if cache.connection().await.is_ok() {
            return;
        }
        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}
