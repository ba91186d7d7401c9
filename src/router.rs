//! Request Router — §4.1.
//!
//! The single axum fallback handler for the whole service. Computes, in
//! order: path classification, bot classification, render-control parameter
//! inspection, cache-rule decision, dispatch — then either serves from
//! cache, drives a render, or falls through to the Transparent Proxy.
//! `/shieldhealth` is registered as its own route ahead of this fallback so
//! reserved paths never reach dispatch logic (§4.1 Transport).

use std::sync::Arc;
use std::time::SystemTime;

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use crate::bot_classifier::{self, BotType, RequestSignals};
use crate::cache::Freshness;
use crate::cache_rules;
use crate::fingerprint::{self, Fingerprint, RenderControl};
use crate::observability::TrafficEvent;
use crate::AppState;

const ASSET_SUFFIXES: [&str; 23] = [
    ".js", ".css", ".png", ".jpg", ".jpeg", ".gif", ".svg", ".webp", ".ico", ".woff", ".woff2",
    ".ttf", ".eot", ".mp4", ".webm", ".mp3", ".wav", ".pdf", ".json", ".xml", ".txt", ".rss",
    ".atom",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathClass {
    Asset,
    Page,
}

fn classify_path(path: &str) -> PathClass {
    if path == "/" || path.ends_with('/') {
        return PathClass::Page;
    }
    if ASSET_SUFFIXES.iter().any(|suffix| path.ends_with(suffix)) {
        PathClass::Asset
    } else {
        PathClass::Page
    }
}

#[derive(Debug, Serialize)]
struct DebugEnvelope {
    target_url: String,
    render_duration_ms: u64,
    body_size: usize,
    status: u16,
    should_cache: bool,
    cache_reason: String,
    is_bot: bool,
    bot_type: BotType,
    confidence: f64,
}

/// The catch-all fallback handler wired up as the service's only route
/// besides `/shieldhealth` (§4.1 Transport).
#[instrument(skip(state, headers, body), fields(path = %uri.path()))]
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let config = state.current_config().await;

    let target_url = match build_target_url(&config, &uri) {
        Some(url) => url,
        None => return (StatusCode::BAD_REQUEST, "malformed request path").into_response(),
    };

    let (fingerprint, control) = fingerprint::canonicalize(&target_url);
    let path_class = classify_path(uri.path());

    if path_class == PathClass::Asset {
        return state.proxy.forward(method, &uri, &headers, body).await;
    }

    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok());
    let has_xff = headers.contains_key("x-forwarded-for");
    let has_via = headers.contains_key("via");
    let client_ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());

    let signals = RequestSignals {
        user_agent,
        path: uri.path(),
        client_ip,
        has_x_forwarded_for: has_xff,
        has_via,
    };
    let classification = bot_classifier::classify(&config, &signals);

    let wants_render = classification.is_bot || control.is_some_and(RenderControl::forces_render);
    let wants_debug = control.is_some_and(RenderControl::is_debug);

    state.observability.emit_traffic(TrafficEvent::request_routed(
        &fingerprint,
        "page",
        classification.is_bot,
        classification.bot_type,
    ));

    if wants_render {
        return render_path(&state, &target_url, &fingerprint, &classification, wants_debug, method, &uri, &headers, body).await;
    }

    human_path(&state, &target_url, &fingerprint, method, &uri, &headers, body).await
}

fn build_target_url(config: &crate::config::ProxyConfig, uri: &Uri) -> Option<Url> {
    let mut url = config.target_url().clone();
    url.set_path(uri.path());
    url.set_query(uri.query());
    Some(url)
}

#[allow(clippy::too_many_arguments)]
async fn render_path(
    state: &Arc<AppState>,
    target_url: &Url,
    fingerprint: &Fingerprint,
    classification: &bot_classifier::Classification,
    wants_debug: bool,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let config = state.current_config().await;

    let decision = cache_rules::decide_by_url(
        &path_and_query(uri),
        config.no_cache_patterns(),
        config.cache_patterns(),
        config.cache_by_default(),
    );

    if !decision.should_render {
        return state.proxy.forward(method, uri, headers, body).await;
    }

    let outcome = state
        .scheduler
        .render(target_url, fingerprint, crate::render::RenderPriority::Normal)
        .await;

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            state
                .observability
                .emit_traffic(TrafficEvent::RenderFailed {
                    fingerprint: fingerprint.as_str().to_string(),
                    kind: scheduler_error_kind(&err),
                });
            return state.proxy.forward(method, uri, headers, body).await;
        }
    };

    let mut should_cache = decision.should_cache;
    let mut cache_reason = decision.reason.clone();
    if should_cache {
        let html_decision = cache_rules::decide_by_html(&outcome.body, config.cache_meta_tag());
        if !html_decision {
            should_cache = false;
            cache_reason = format!("{cache_reason} (overridden by HTML meta tag)");
        }
    }

    if should_cache {
        let snapshot = crate::cache::Snapshot {
            body: outcome.body.clone(),
            status: outcome.status,
            rendered_at: SystemTime::now(),
            ttl: config.cache_ttl(),
        };
        if let Err(e) = state.cache.set(fingerprint, snapshot).await {
            tracing::debug!(error = %e, "render result rejected by cache adapter");
        }
    }

    state.observability.emit_traffic(TrafficEvent::RenderCompleted {
        fingerprint: fingerprint.as_str().to_string(),
        status: outcome.status,
        duration_ms: outcome.duration_ms,
        blocked: outcome.blocked,
        allowed: outcome.allowed,
    });

    if wants_debug {
        return Json(DebugEnvelope {
            target_url: target_url.to_string(),
            render_duration_ms: outcome.duration_ms,
            body_size: outcome.body.len(),
            status: outcome.status,
            should_cache,
            cache_reason,
            is_bot: classification.is_bot,
            bot_type: classification.bot_type,
            confidence: classification.confidence,
        })
        .into_response();
    }

    html_response(outcome.status, outcome.body, "MISS", &cache_reason)
}

async fn human_path(
    state: &Arc<AppState>,
    target_url: &Url,
    fingerprint: &Fingerprint,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Body,
) -> Response {
    let now = SystemTime::now();
    match state.cache.get_with_freshness(fingerprint, now).await {
        Ok(Some((snapshot, freshness))) => {
            let is_stale = freshness != Freshness::Fresh;
            state
                .observability
                .emit_traffic(TrafficEvent::cache_hit(fingerprint, is_stale));

            if freshness != Freshness::Fresh {
                spawn_background_refill(state.clone(), target_url.clone(), fingerprint.clone());
            }

            let status_label = if is_stale { "STALE" } else { "HIT" };
            html_response(snapshot.status, snapshot.body, status_label, "cached snapshot")
        }
        Ok(None) => {
            state
                .observability
                .emit_traffic(TrafficEvent::cache_miss(fingerprint));
            state.proxy.forward(method, uri, headers, body).await
        }
        Err(e) => {
            tracing::debug!(error = %e, "cache read unavailable, treating as miss");
            state.proxy.forward(method, uri, headers, body).await
        }
    }
}

/// Fires a background SWR refill: re-renders and overwrites the cache
/// entry. Never touches the response already sent to the human client.
fn spawn_background_refill(state: Arc<AppState>, target_url: Url, fingerprint: Fingerprint) {
    tokio::spawn(async move {
        let config = state.current_config().await;
        let outcome = state
            .scheduler
            .render(&target_url, &fingerprint, crate::render::RenderPriority::Low)
            .await;
        let Ok(outcome) = outcome else {
            return;
        };
        let snapshot = crate::cache::Snapshot {
            body: outcome.body,
            status: outcome.status,
            rendered_at: SystemTime::now(),
            ttl: config.cache_ttl(),
        };
        let _ = state.cache.set(&fingerprint, snapshot).await;
    });
}

fn path_and_query(uri: &Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

fn scheduler_error_kind(err: &crate::error::SchedulerError) -> &'static str {
    match err {
        crate::error::SchedulerError::DeadlineExceeded => "deadline_exceeded",
        crate::error::SchedulerError::Render(_) => "render_error",
        crate::error::SchedulerError::Closed => "scheduler_closed",
    }
}

fn html_response(status: u16, body: String, cache_status: &str, cache_rule: &str) -> Response {
    let status_code = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    Response::builder()
        .status(status_code)
        .header(axum::http::header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header("X-Rendered-By", "seo-shield-proxy")
        .header("X-Cache-Status", cache_status)
        .header("X-Cache-Rule", cache_rule)
        .body(Body::from(body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}
