//! Observability Hooks — §4.8.
//!
//! `emit_traffic` is non-blocking from the router's and renderer's
//! perspective: it publishes onto a `tokio::sync::broadcast` channel sized
//! by `OBSERVABILITY_CHANNEL_CAPACITY` and returns immediately. A background
//! task drains the channel into a `tracing`-backed line logger, the only
//! sink the core wires up; a full channel (a subscriber lagging behind the
//! publish rate) silently drops the oldest unread events for that
//! subscriber, counted via `dropped` rather than blocking the publisher.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bot_classifier::BotType;
use crate::fingerprint::Fingerprint;

/// A tagged-variant traffic/render event. Each variant carries only the
/// fields it needs; consumers match exhaustively (§3 Traffic Event).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind")]
pub enum TrafficEvent {
    RequestRouted {
        fingerprint: String,
        class: &'static str,
        is_bot: bool,
        bot_type: BotType,
    },
    RenderCompleted {
        fingerprint: String,
        status: u16,
        duration_ms: u64,
        blocked: u32,
        allowed: u32,
    },
    RenderFailed {
        fingerprint: String,
        kind: &'static str,
    },
    CacheHit {
        fingerprint: String,
        is_stale: bool,
    },
    CacheMiss {
        fingerprint: String,
    },
    ProxyForwarded {
        fingerprint: String,
        status: u16,
    },
    ProxyFailed {
        fingerprint: String,
        reason: String,
    },
}

impl TrafficEvent {
    #[must_use]
    pub fn request_routed(fp: &Fingerprint, class: &'static str, is_bot: bool, bot_type: BotType) -> Self {
        Self::RequestRouted {
            fingerprint: fp.as_str().to_string(),
            class,
            is_bot,
            bot_type,
        }
    }

    #[must_use]
    pub fn cache_hit(fp: &Fingerprint, is_stale: bool) -> Self {
        Self::CacheHit {
            fingerprint: fp.as_str().to_string(),
            is_stale,
        }
    }

    #[must_use]
    pub fn cache_miss(fp: &Fingerprint) -> Self {
        Self::CacheMiss {
            fingerprint: fp.as_str().to_string(),
        }
    }

    #[must_use]
    pub fn proxy_forwarded(fp: &Fingerprint, status: u16) -> Self {
        Self::ProxyForwarded {
            fingerprint: fp.as_str().to_string(),
            status,
        }
    }

    #[must_use]
    pub fn proxy_failed(fp: &Fingerprint, reason: impl Into<String>) -> Self {
        Self::ProxyFailed {
            fingerprint: fp.as_str().to_string(),
            reason: reason.into(),
        }
    }
}

/// Publish/drop counters, readable without touching the channel itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservabilityStats {
    pub published: u64,
    pub dropped: u64,
}

pub struct ObservabilityBus {
    sender: broadcast::Sender<TrafficEvent>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl ObservabilityBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Never blocks and never errors observably: a channel with no
    /// subscribers still counts as published (§4.8's "at-most-once, may
    /// drop under pressure" contract).
    pub fn emit_traffic(&self, event: TrafficEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn stats(&self) -> ObservabilityStats {
        ObservabilityStats {
            published: self.published.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    /// Spawns the line-logger sink. The returned handle is aborted by the
    /// caller during graceful shutdown.
    pub fn spawn_logger_sink(self: &std::sync::Arc<Self>) -> JoinHandle<()> {
        let bus = std::sync::Arc::clone(self);
        let mut rx = bus.sender.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        bus.dropped.fetch_add(skipped, Ordering::Relaxed);
                        warn!(skipped, "observability sink lagged, dropping oldest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn log_event(event: &TrafficEvent) {
    match event {
        TrafficEvent::RequestRouted { fingerprint, class, is_bot, bot_type } => {
            info!(fingerprint, class, is_bot, ?bot_type, "request routed");
        }
        TrafficEvent::RenderCompleted { fingerprint, status, duration_ms, blocked, allowed } => {
            info!(fingerprint, status, duration_ms, blocked, allowed, "render completed");
        }
        TrafficEvent::RenderFailed { fingerprint, kind } => {
            warn!(fingerprint, kind, "render failed, downgrading to proxy");
        }
        TrafficEvent::CacheHit { fingerprint, is_stale } => {
            info!(fingerprint, is_stale, "cache hit");
        }
        TrafficEvent::CacheMiss { fingerprint } => {
            info!(fingerprint, "cache miss");
        }
        TrafficEvent::ProxyForwarded { fingerprint, status } => {
            info!(fingerprint, status, "transparent proxy forwarded");
        }
        TrafficEvent::ProxyFailed { fingerprint, reason } => {
            warn!(fingerprint, reason, "transparent proxy failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emit_without_subscribers_does_not_panic_or_block() {
        let bus = ObservabilityBus::new(8);
        let fp = Fingerprint::from("https://example.com/".to_string());
        bus.emit_traffic(TrafficEvent::cache_miss(&fp));
        assert_eq!(bus.stats().published, 1);
    }

    #[tokio::test]
    async fn logger_sink_drains_published_events() {
        let bus = std::sync::Arc::new(ObservabilityBus::new(8));
        let handle = bus.spawn_logger_sink();
        let fp = Fingerprint::from("https://example.com/".to_string());
        bus.emit_traffic(TrafficEvent::cache_miss(&fp));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        handle.abort();
        assert_eq!(bus.stats().published, 1);
    }
}
