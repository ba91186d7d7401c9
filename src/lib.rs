//! Bot-aware reverse proxy core.
//!
//! Wires the eight components from the design together: classification and
//! dispatch live in [`router`], the cache-eligibility rules in
//! [`cache_rules`], storage in [`cache`], bounded concurrent rendering in
//! [`render`], transparent forwarding in [`proxy`], and the non-blocking
//! traffic/render event bus in [`observability`]. `build_router` assembles
//! the axum `Router`; `bootstrap` is the process entry point used by `main`.

pub mod bot_classifier;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod cache;
pub mod cache_rules;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod health;
pub mod observability;
pub mod proxy;
pub mod render;
pub mod router;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::browser_pool::{BrowserPool, BrowserPoolConfig};
use crate::cache::{CacheAdapter, LocalCache, RemoteCache};
use crate::config::{CacheBackendKind, ProxyConfig};
use crate::observability::ObservabilityBus;
use crate::proxy::TransparentProxy;
use crate::render::{PageRenderer, RenderScheduler};

/// Process-wide shared state handed to every axum handler.
///
/// `config` is held behind a lock so a future reload can swap the whole
/// snapshot atomically (§9: "runtime-pluggable classes... behind an atomic
/// pointer; reloads swap the pointer so in-flight requests always see a
/// coherent view"); today nothing mutates it after `bootstrap`, but handlers
/// already read through `current_config()` rather than holding `ProxyConfig`
/// directly so a reload path can be added without touching dispatch code.
pub struct AppState {
    pub config: RwLock<Arc<ProxyConfig>>,
    pub cache: Arc<dyn CacheAdapter>,
    pub scheduler: Arc<RenderScheduler>,
    pub proxy: TransparentProxy,
    pub observability: Arc<ObservabilityBus>,
    pub browser_pool: Arc<BrowserPool>,
}

impl AppState {
    /// Snapshot of the current configuration. Cheap: one `Arc` clone behind
    /// a short read-lock critical section, never held across an await point
    /// elsewhere in the request path.
    pub async fn current_config(&self) -> Arc<ProxyConfig> {
        self.config.read().await.clone()
    }
}

/// Builds the cache backend named by `config.cache_type()`. Returns the
/// concrete `RemoteCache` alongside the trait object too, so the caller can
/// spawn its reconnect-backoff task without a downcast.
///
/// # Errors
/// Returns an error only for `CacheBackendKind::Remote` with a malformed
/// `CACHE_ENDPOINT`; this is the one cache failure class that is fatal at
/// startup (§7).
pub fn build_cache(
    config: &ProxyConfig,
) -> anyhow::Result<(Arc<dyn CacheAdapter>, Option<Arc<RemoteCache>>)> {
    match config.cache_type() {
        CacheBackendKind::Local => Ok((Arc::new(LocalCache::new()), None)),
        CacheBackendKind::Remote => {
            let endpoint = config
                .cache_endpoint()
                .ok_or_else(|| anyhow::anyhow!("CACHE_ENDPOINT required for remote cache"))?;
            let remote = Arc::new(
                RemoteCache::new(endpoint)
                    .map_err(|e| anyhow::anyhow!("failed to initialize remote cache: {e}"))?,
            );
            Ok((remote.clone() as Arc<dyn CacheAdapter>, Some(remote)))
        }
    }
}

/// Assembles every process-wide singleton (browser pool, cache, scheduler,
/// proxy, observability bus) into one `AppState`, starting the browser
/// pool's background tasks in the process.
///
/// # Errors
/// Propagates cache-backend initialization failures and transparent-proxy
/// client construction failures; both are fatal at startup (§7).
pub async fn build_state(config: ProxyConfig) -> anyhow::Result<Arc<AppState>> {
    let config = Arc::new(config);

    let pool_config = BrowserPoolConfig {
        min_pool_size: config.min_pool_size(),
        max_pool_size: config.max_pool_size(),
        ..BrowserPoolConfig::default()
    };
    let browser_pool = BrowserPool::new(pool_config);
    browser_pool
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start browser pool: {e}"))?;

    let renderer = PageRenderer::new(
        browser_pool.clone(),
        config.blocked_domains().to_vec(),
        config.blocked_path_substrings().to_vec(),
        config.puppeteer_timeout(),
    );
    let scheduler = RenderScheduler::new(
        renderer,
        config.max_concurrent_renders(),
        config.puppeteer_timeout(),
    );

    let (cache, remote_handle) = build_cache(&config)?;
    if let Some(remote) = remote_handle {
        tokio::spawn(async move {
            crate::cache::remote::wait_until_ready(&remote).await;
            info!("remote cache backend is ready");
        });
    }

    let proxy = TransparentProxy::new(config.target_url().clone())
        .map_err(|e| anyhow::anyhow!("failed to build transparent proxy client: {e}"))?;

    let observability = Arc::new(ObservabilityBus::new(config.observability_channel_capacity()));
    observability.spawn_logger_sink();

    Ok(Arc::new(AppState {
        config: RwLock::new(config),
        cache,
        scheduler,
        proxy,
        observability,
        browser_pool,
    }))
}

/// Builds the axum `Router`: `/shieldhealth` ahead of the catch-all
/// dispatch fallback so reserved paths never reach render/proxy logic
/// (§4.1, §6).
#[must_use]
pub fn build_router(state: Arc<AppState>) -> axum::Router {
    use axum::routing::get;
    use tower_http::compression::CompressionLayer;
    use tower_http::trace::TraceLayer;

    axum::Router::new()
        .route("/shieldhealth", get(health::shield_health))
        .fallback(router::dispatch)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Runs the proxy to completion: binds `state`'s configured port, serves
/// `build_router(state)`, and on SIGINT/SIGTERM drains in-flight renders
/// (bounded by `shutdown_timeout`), closes the browser pool, and returns.
///
/// # Errors
/// Returns an error if the listener fails to bind or the server exits with
/// an I/O error.
pub async fn serve(state: Arc<AppState>) -> anyhow::Result<()> {
    let port = state.current_config().await.port();
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "seo-shield-proxy listening");

    let router = build_router(state.clone());

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let shutdown_timeout = state.current_config().await.shutdown_timeout();
    info!(?shutdown_timeout, "draining in-flight renders");
    state.scheduler.close(shutdown_timeout).await;

    if let Err(e) = state.browser_pool.shutdown().await {
        warn!(error = %e, "browser pool shutdown reported an error");
    }

    info!("seo-shield-proxy shutdown complete");
    Ok(())
}

/// Awaits SIGINT (Ctrl-C) or, on Unix, SIGTERM — whichever arrives first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}

/// Loads configuration from the environment and builds `AppState`. The only
/// entry point `main` needs; split out so integration tests can build an
/// `AppState` from a programmatically constructed `ProxyConfig` instead.
///
/// # Errors
/// Propagates configuration validation errors (fatal, §7) and the errors
/// from `build_state`.
pub async fn bootstrap() -> anyhow::Result<Arc<AppState>> {
    let config = config::load()?;
    build_state(config).await
}
