//! Cache Adapter — a storage-agnostic snapshot store with SWR freshness
//! semantics.
//!
//! The trait shape and the split into `local`/`remote` backends follows the
//! reference crate's convention of keeping storage backends behind a small
//! trait (see `search/indexer`'s backend split) while the actual snapshot
//! body is this crate's own `Snapshot` type (open question 1 in SPEC_FULL.md:
//! one storage envelope used by both the bot-HTML path and the debug-JSON
//! path).

pub mod local;
pub mod remote;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::fingerprint::Fingerprint;

pub use local::LocalCache;
pub use remote::RemoteCache;

/// Maximum cacheable body size (10 MiB), matching the reference crate's
/// size ceiling on saved content (`content_saver`).
pub const MAX_CACHEABLE_BYTES: usize = 10 * 1024 * 1024;

/// The single storage envelope shared by every cached path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub body: String,
    pub status: u16,
    pub rendered_at: SystemTime,
    pub ttl: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale,
    Expired,
}

impl Snapshot {
    /// Fresh while `now < rendered_at + 0.8 * ttl`, stale while
    /// `now < rendered_at + ttl`, expired thereafter (§4.4).
    #[must_use]
    pub fn freshness(&self, now: SystemTime) -> Freshness {
        let age = now
            .duration_since(self.rendered_at)
            .unwrap_or(Duration::ZERO);
        let fresh_boundary = self.ttl.mul_f64(0.8);
        if age < fresh_boundary {
            Freshness::Fresh
        } else if age < self.ttl {
            Freshness::Stale
        } else {
            Freshness::Expired
        }
    }
}

/// Point-in-time stats snapshot, readable without blocking writers (§4.4(d)).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub key_count: u64,
    pub byte_size: u64,
}

/// Storage-agnostic cache backend. Implementations must never panic on a
/// backend outage; they surface `CacheError::Backend`/`NotReady` instead so
/// callers can fall back to a live render.
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    async fn get(&self, key: &Fingerprint) -> Result<Option<Snapshot>, CacheError>;

    /// Returns the snapshot together with its freshness relative to `now`,
    /// so callers don't need a second clock read.
    async fn get_with_freshness(
        &self,
        key: &Fingerprint,
        now: SystemTime,
    ) -> Result<Option<(Snapshot, Freshness)>, CacheError> {
        Ok(self
            .get(key)
            .await?
            .map(|snapshot| {
                let freshness = snapshot.freshness(now);
                (snapshot, freshness)
            }))
    }

    async fn set(&self, key: &Fingerprint, snapshot: Snapshot) -> Result<(), CacheError>;

    async fn delete(&self, key: &Fingerprint) -> Result<(), CacheError>;

    async fn flush(&self) -> Result<(), CacheError>;

    /// Enumerates every key currently stored, for debug/inspection routes.
    async fn keys(&self) -> Result<Vec<Fingerprint>, CacheError>;

    /// Enumerates every (key, snapshot) pair currently stored.
    async fn entries(&self) -> Result<Vec<(Fingerprint, Snapshot)>, CacheError>;

    /// Hit/miss/key-count/byte-size stats, readable without blocking
    /// writers. `get`/`get_with_freshness` update the hit/miss counters;
    /// `set`/`delete`/`flush` update key-count and byte-size.
    fn stats(&self) -> CacheStats;
}

pub(crate) fn validate_body(body: &str) -> Result<(), CacheError> {
    if body.is_empty() {
        return Err(CacheError::Empty);
    }
    if body.len() > MAX_CACHEABLE_BYTES {
        return Err(CacheError::TooLarge);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(ttl_secs: u64, age_secs: u64) -> (Snapshot, SystemTime) {
        let rendered_at = SystemTime::UNIX_EPOCH;
        let now = rendered_at + Duration::from_secs(age_secs);
        (
            Snapshot {
                body: "<html></html>".to_string(),
                status: 200,
                rendered_at,
                ttl: Duration::from_secs(ttl_secs),
            },
            now,
        )
    }

    #[test]
    fn fresh_before_eighty_percent_ttl() {
        let (snap, now) = snapshot(100, 50);
        assert_eq!(snap.freshness(now), Freshness::Fresh);
    }

    #[test]
    fn stale_between_eighty_percent_and_full_ttl() {
        let (snap, now) = snapshot(100, 90);
        assert_eq!(snap.freshness(now), Freshness::Stale);
    }

    #[test]
    fn expired_after_full_ttl() {
        let (snap, now) = snapshot(100, 150);
        assert_eq!(snap.freshness(now), Freshness::Expired);
    }

    #[test]
    fn validate_body_rejects_empty() {
        assert!(matches!(validate_body(""), Err(CacheError::Empty)));
    }

    #[test]
    fn validate_body_rejects_oversized() {
        let big = "a".repeat(MAX_CACHEABLE_BYTES + 1);
        assert!(matches!(validate_body(&big), Err(CacheError::TooLarge)));
    }
}
