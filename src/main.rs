//! seo-shield-proxy binary entry point.
//!
//! Loads configuration from the environment, builds the shared `AppState`
//! (browser pool, cache backend, render scheduler, transparent proxy,
//! observability bus), and serves the axum router until SIGINT/SIGTERM.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let state = match seo_shield_proxy::bootstrap().await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "fatal error during startup");
            std::process::exit(1);
        }
    };

    seo_shield_proxy::serve(state).await
}
