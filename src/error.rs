//! Per-component error types.
//!
//! Each component boundary gets a small `thiserror` enum; call sites that
//! aggregate several of these (handlers, the scheduler's orchestration code)
//! wrap them in `anyhow::Result` with `.context(...)`, matching the
//! reference crate's convention of typed leaf errors plus `anyhow` glue.

use thiserror::Error;

/// Errors surfaced by the Page Renderer. Never propagated to clients; the
/// router converts all of these into a Transparent Proxy fallback.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("navigation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("CDP protocol error: {0}")]
    Protocol(String),

    #[error("browser context crashed: {0}")]
    ContextCrash(String),

    #[error("browser pool exhausted or unavailable: {0}")]
    PoolUnavailable(String),
}

/// Errors surfaced by the Cache Adapter.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("body exceeds maximum cacheable size")]
    TooLarge,

    #[error("empty body rejected")]
    Empty,

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache backend not ready")]
    NotReady,
}

/// Errors surfaced by the Render Scheduler. These reach subscribers of a
/// single-flight render, never the router directly — the router always
/// maps them to a Transparent Proxy fallback.
#[derive(Debug, Clone, Error)]
pub enum SchedulerError {
    #[error("render deadline exceeded")]
    DeadlineExceeded,

    #[error("renderer failed: {0}")]
    Render(String),

    #[error("scheduler is shutting down")]
    Closed,
}

impl From<RenderError> for SchedulerError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Timeout(_) => Self::DeadlineExceeded,
            other => Self::Render(other.to_string()),
        }
    }
}

/// Errors surfaced by the Transparent Proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to reach origin: {0}")]
    Dial(#[from] reqwest::Error),

    #[error("invalid upstream request: {0}")]
    InvalidRequest(String),
}

/// Errors surfaced while loading and validating configuration. These are
/// the only error class that aborts the process.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingRequired(&'static str),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
