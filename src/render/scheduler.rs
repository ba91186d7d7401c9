//! Render Scheduler — §4.5.
//!
//! Owns the single-flight table (one in-flight render per fingerprint,
//! process-wide) and the `N`-wide concurrency semaphore. Mirrors the
//! pre-warmed-pool-plus-semaphore shape `browser_pool` uses for browser
//! instances, generalized from a pool-size bound to a job-concurrency bound.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{broadcast, Semaphore};
use tracing::warn;
use url::Url;

use crate::error::SchedulerError;
use crate::fingerprint::Fingerprint;

use super::renderer::{PageRenderer, RenderOutcome};

/// How many waiters a single in-flight render's broadcast channel can hold
/// before a slow subscriber starts lagging. Generous since subscribers only
/// ever receive one message before dropping the receiver.
const RESULT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RenderPriority {
    Low,
    Normal,
    High,
}

impl Default for RenderPriority {
    fn default() -> Self {
        Self::Normal
    }
}

#[derive(Debug, Default)]
struct MetricsInner {
    queued: AtomicUsize,
    processing: AtomicUsize,
    completed: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time queue metrics snapshot (§3 Queue Metrics).
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueMetrics {
    pub queued: usize,
    pub processing: usize,
    pub completed: u64,
    pub errors: u64,
    pub max_concurrency: usize,
}

type ResultChannel = broadcast::Sender<Result<RenderOutcome, SchedulerError>>;

pub struct RenderScheduler {
    renderer: Arc<PageRenderer>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    puppeteer_timeout: Duration,
    inflight: DashMap<Fingerprint, ResultChannel>,
    metrics: MetricsInner,
    closed: std::sync::atomic::AtomicBool,
}

impl RenderScheduler {
    #[must_use]
    pub fn new(renderer: PageRenderer, max_concurrency: usize, puppeteer_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            renderer: Arc::new(renderer),
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            puppeteer_timeout,
            inflight: DashMap::new(),
            metrics: MetricsInner::default(),
            closed: std::sync::atomic::AtomicBool::new(false),
        })
    }

    /// Renders `url`, deduplicating concurrent callers that share the same
    /// `fingerprint` onto a single in-flight job (§4.5 single-flight).
    ///
    /// `priority` is recorded but does not currently reorder the wait queue
    /// beyond the semaphore's FIFO acquisition order; the queue is always
    /// first-come-first-served as §4.5 requires, and priority is available
    /// for a future scheduler revision that adds tiered dispatch.
    pub async fn render(
        &self,
        url: &Url,
        fingerprint: &Fingerprint,
        _priority: RenderPriority,
    ) -> Result<RenderOutcome, SchedulerError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(SchedulerError::Closed);
        }

        let (tx, is_owner) = match self.inflight.entry(fingerprint.clone()) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let (tx, _rx) = broadcast::channel(RESULT_CHANNEL_CAPACITY);
                entry.insert(tx.clone());
                (tx, true)
            }
        };

        if !is_owner {
            let mut rx = tx.subscribe();
            return rx.recv().await.unwrap_or(Err(SchedulerError::Closed));
        }

        self.metrics.queued.fetch_add(1, Ordering::Relaxed);
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
                self.inflight.remove(fingerprint);
                let _ = tx.send(Err(SchedulerError::Closed));
                return Err(SchedulerError::Closed);
            }
        };
        self.metrics.queued.fetch_sub(1, Ordering::Relaxed);
        self.metrics.processing.fetch_add(1, Ordering::Relaxed);

        let render_fut = self.renderer.render_once(url);
        let result = match tokio::time::timeout(self.puppeteer_timeout, render_fut).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(render_err)) => Err(SchedulerError::from(render_err)),
            Err(_) => Err(SchedulerError::DeadlineExceeded),
        };

        drop(permit);
        self.metrics.processing.fetch_sub(1, Ordering::Relaxed);
        match &result {
            Ok(_) => {
                self.metrics.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.inflight.remove(fingerprint);
        // No receivers is normal (every waiter may have timed out and left);
        // the owning caller still holds `result` regardless.
        let _ = tx.send(result.clone());
        result
    }

    #[must_use]
    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            queued: self.metrics.queued.load(Ordering::Relaxed),
            processing: self.metrics.processing.load(Ordering::Relaxed),
            completed: self.metrics.completed.load(Ordering::Relaxed),
            errors: self.metrics.errors.load(Ordering::Relaxed),
            max_concurrency: self.max_concurrency,
        }
    }

    /// Marks the scheduler closed and waits for in-flight jobs to drain, up
    /// to `timeout`. New calls to `render` fail fast with `SchedulerError::Closed`.
    pub async fn close(&self, timeout: Duration) {
        self.closed.store(true, Ordering::Relaxed);
        let deadline = tokio::time::Instant::now() + timeout;
        while self.metrics.processing.load(Ordering::Relaxed) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    processing = self.metrics.processing.load(Ordering::Relaxed),
                    "render scheduler shutdown deadline reached with jobs still running"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering_is_low_normal_high() {
        assert!(RenderPriority::Low < RenderPriority::Normal);
        assert!(RenderPriority::Normal < RenderPriority::High);
    }

    #[test]
    fn default_priority_is_normal() {
        assert_eq!(RenderPriority::default(), RenderPriority::Normal);
    }
}
