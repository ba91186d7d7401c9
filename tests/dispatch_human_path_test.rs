//! Request Router — §4.1 integration tests for the human (non-bot) path,
//! which never touches the render scheduler, so these build an `AppState`
//! whose browser pool is constructed but never started.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use seo_shield_proxy::browser_pool::{BrowserPool, BrowserPoolConfig};
use seo_shield_proxy::cache::{CacheAdapter, LocalCache, Snapshot};
use seo_shield_proxy::config::ProxyConfig;
use seo_shield_proxy::fingerprint;
use seo_shield_proxy::observability::ObservabilityBus;
use seo_shield_proxy::proxy::TransparentProxy;
use seo_shield_proxy::render::{PageRenderer, RenderScheduler};
use seo_shield_proxy::{build_router, AppState};
use tokio::sync::RwLock;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn state_for(server: &MockServer) -> (Arc<AppState>, Arc<dyn CacheAdapter>) {
    let target_url = url::Url::parse(&server.uri()).unwrap();
    let config = Arc::new(ProxyConfig::builder().target_url(target_url.as_str()).build().unwrap());

    let browser_pool = BrowserPool::new(BrowserPoolConfig::default());
    let renderer = PageRenderer::new(
        browser_pool.clone(),
        config.blocked_domains().to_vec(),
        config.blocked_path_substrings().to_vec(),
        config.puppeteer_timeout(),
    );
    let scheduler = RenderScheduler::new(renderer, config.max_concurrent_renders(), config.puppeteer_timeout());
    let cache: Arc<dyn CacheAdapter> = Arc::new(LocalCache::new());
    let proxy = TransparentProxy::new(target_url).unwrap();
    let observability = Arc::new(ObservabilityBus::new(config.observability_channel_capacity()));

    let state = Arc::new(AppState {
        config: RwLock::new(config),
        cache: cache.clone(),
        scheduler,
        proxy,
        observability,
        browser_pool,
    });
    (state, cache)
}

#[tokio::test]
async fn human_cache_miss_falls_through_to_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>about</html>"))
        .mount(&server)
        .await;

    let (state, _cache) = state_for(&server).await;
    let app = build_router(state);

    let request = Request::builder()
        .uri("/about")
        .header("user-agent", "Mozilla/5.0 (Windows NT 10.0) Chrome/120.0 Safari/537.36")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<html>about</html>");
}

#[tokio::test]
async fn human_fresh_cache_hit_is_served_without_touching_origin() {
    let server = MockServer::start().await;
    // No mock mounted: if dispatch fell through to the origin it would get
    // wiremock's default 404, so a 200 here proves the cache path served it.

    let (state, cache) = state_for(&server).await;
    let target_url = {
        let mut u = url::Url::parse(&server.uri()).unwrap();
        u.set_path("/fresh");
        u
    };
    let (fp, _) = fingerprint::canonicalize(&target_url);
    cache
        .set(
            &fp,
            Snapshot {
                body: "<html>cached fresh</html>".to_string(),
                status: 200,
                rendered_at: SystemTime::now(),
                ttl: Duration::from_secs(3600),
            },
        )
        .await
        .unwrap();

    let app = build_router(state);
    let request = Request::builder()
        .uri("/fresh")
        .header("user-agent", "Mozilla/5.0 (Macintosh) Chrome/120.0 Safari/537.36")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-cache-status").unwrap(), "HIT");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"<html>cached fresh</html>");
}

#[tokio::test]
async fn asset_paths_bypass_classification_and_cache_entirely() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
        .mount(&server)
        .await;

    let (state, _cache) = state_for(&server).await;
    let app = build_router(state);

    let request = Request::builder()
        .uri("/app.js")
        .header("user-agent", "Googlebot/2.1")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"console.log(1)");
}

#[tokio::test]
async fn shield_health_route_reports_queue_and_cache_stats() {
    let server = MockServer::start().await;
    let (state, _cache) = state_for(&server).await;
    let app = build_router(state);

    let request = Request::builder().uri("/shieldhealth").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
