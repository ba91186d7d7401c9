//! `GET /shieldhealth` — §6. Registered before the catch-all fallback so it
//! never enters the render/proxy dispatch path.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    service: &'static str,
    target: String,
    timestamp: u64,
    queue: QueueStats,
    cache: CacheStatsResponse,
}

#[derive(Debug, Serialize)]
struct QueueStats {
    queued: usize,
    processing: usize,
    completed: u64,
    errors: u64,
    max_concurrency: usize,
}

#[derive(Debug, Serialize)]
struct CacheStatsResponse {
    hits: u64,
    misses: u64,
    key_count: u64,
    byte_size: u64,
}

pub async fn shield_health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let config = state.current_config().await;
    let queue = state.scheduler.metrics();
    let cache = state.cache.stats();
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(HealthResponse {
        status: "ok",
        service: "seo-shield-proxy",
        target: config.target_url().to_string(),
        timestamp,
        queue: QueueStats {
            queued: queue.queued,
            processing: queue.processing,
            completed: queue.completed,
            errors: queue.errors,
            max_concurrency: queue.max_concurrency,
        },
        cache: CacheStatsResponse {
            hits: cache.hits,
            misses: cache.misses,
            key_count: cache.key_count,
            byte_size: cache.byte_size,
        },
    })
}
