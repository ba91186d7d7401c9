//! `ProxyConfig` — the immutable configuration snapshot.
//!
//! Holds everything derived once at startup: pre-compiled cache-rule
//! pattern lists, the bot-rule registry, and the plain scalar knobs from
//! §6. Follows the reference crate's `CrawlConfig` convention of
//! pre-compiling patterns at construction time (`excluded_patterns_compiled`)
//! rather than on the hot path.

use std::time::Duration;

use url::Url;

use crate::bot_classifier::BotRule;
use crate::cache_rules::CompiledPattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Local,
    Remote,
}

/// Resource types blocked during rendering, matching the reference crate's
/// CDP resource-type strings.
pub const BLOCKED_RESOURCE_TYPES: [&str; 6] =
    ["image", "stylesheet", "font", "media", "websocket", "eventsource"];

pub const DEFAULT_BLOCKED_DOMAINS: &[&str] = &[
    "google-analytics.com",
    "googletagmanager.com",
    "doubleclick.net",
    "facebook.net",
    "connect.facebook.net",
    "hotjar.com",
    "segment.io",
    "mixpanel.com",
    "amplitude.com",
    "intercom.io",
    "fullstory.com",
];

pub const DEFAULT_BLOCKED_PATH_SUBSTRINGS: &[&str] = &[
    "/analytics",
    "/gtm",
    "/fbevents",
    "/pixel",
    "/tracking",
    "/collect",
    "/ads/",
    "/doubleclick",
    "/widgets",
    "/embed",
    "/favicon.ico",
];

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub(crate) port: u16,
    pub(crate) target_url: Url,
    pub(crate) cache_ttl: Duration,
    pub(crate) cache_type: CacheBackendKind,
    pub(crate) cache_endpoint: Option<String>,
    pub(crate) puppeteer_timeout: Duration,
    pub(crate) max_concurrent_renders: usize,
    pub(crate) no_cache_patterns: Vec<CompiledPattern>,
    pub(crate) cache_patterns: Vec<CompiledPattern>,
    pub(crate) cache_by_default: bool,
    pub(crate) cache_meta_tag: String,
    pub(crate) min_pool_size: usize,
    pub(crate) max_pool_size: usize,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) observability_channel_capacity: usize,
    pub(crate) bot_rules: Vec<BotRule>,
    pub(crate) blocked_domains: Vec<String>,
    pub(crate) blocked_path_substrings: Vec<String>,
}

impl ProxyConfig {
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn cache_type(&self) -> CacheBackendKind {
        self.cache_type
    }

    #[must_use]
    pub fn cache_endpoint(&self) -> Option<&str> {
        self.cache_endpoint.as_deref()
    }

    #[must_use]
    pub fn puppeteer_timeout(&self) -> Duration {
        self.puppeteer_timeout
    }

    #[must_use]
    pub fn max_concurrent_renders(&self) -> usize {
        self.max_concurrent_renders
    }

    #[must_use]
    pub fn no_cache_patterns(&self) -> &[CompiledPattern] {
        &self.no_cache_patterns
    }

    #[must_use]
    pub fn cache_patterns(&self) -> &[CompiledPattern] {
        &self.cache_patterns
    }

    #[must_use]
    pub fn cache_by_default(&self) -> bool {
        self.cache_by_default
    }

    #[must_use]
    pub fn cache_meta_tag(&self) -> &str {
        &self.cache_meta_tag
    }

    #[must_use]
    pub fn min_pool_size(&self) -> usize {
        self.min_pool_size
    }

    #[must_use]
    pub fn max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    #[must_use]
    pub fn observability_channel_capacity(&self) -> usize {
        self.observability_channel_capacity
    }

    #[must_use]
    pub fn bot_rules(&self) -> &[BotRule] {
        &self.bot_rules
    }

    #[must_use]
    pub fn blocked_domains(&self) -> &[String] {
        &self.blocked_domains
    }

    #[must_use]
    pub fn blocked_path_substrings(&self) -> &[String] {
        &self.blocked_path_substrings
    }
}
