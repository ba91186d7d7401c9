//! Type-safe builder for `ProxyConfig` using the typestate pattern.
//!
//! Mirrors the reference crate's `CrawlConfigBuilder<State>` (see the
//! teacher's `config/builder.rs`): a `PhantomData` marker tracks whether
//! `target_url` has been supplied, so calling `.build()` before it is set
//! is a compile error rather than a runtime panic. `TARGET_URL` is the only
//! required field in §6's environment table, so there is only one state
//! transition here instead of the teacher's two.

use std::marker::PhantomData;
use std::time::Duration;

use url::Url;

use crate::bot_classifier::rules::{default_registry, BotRule};
use crate::cache_rules::compile_pattern_list;
use crate::error::ConfigError;

use super::types::{CacheBackendKind, ProxyConfig, DEFAULT_BLOCKED_DOMAINS, DEFAULT_BLOCKED_PATH_SUBSTRINGS};

pub struct Unset;
pub struct WithTargetUrl;

pub struct ProxyConfigBuilder<State = Unset> {
    target_url: Option<String>,
    port: u16,
    cache_ttl_secs: u64,
    cache_type: CacheBackendKind,
    cache_endpoint: Option<String>,
    puppeteer_timeout_ms: u64,
    max_concurrent_renders: usize,
    no_cache_patterns_csv: String,
    cache_patterns_csv: String,
    cache_by_default: bool,
    cache_meta_tag: String,
    min_pool_size: usize,
    max_pool_size: usize,
    shutdown_timeout_secs: u64,
    observability_channel_capacity: usize,
    bot_rules: Option<Vec<BotRule>>,
    _phantom: PhantomData<State>,
}

impl Default for ProxyConfigBuilder<Unset> {
    fn default() -> Self {
        Self {
            target_url: None,
            port: 8080,
            cache_ttl_secs: 3600,
            cache_type: CacheBackendKind::Local,
            cache_endpoint: None,
            puppeteer_timeout_ms: 30_000,
            max_concurrent_renders: 5,
            no_cache_patterns_csv: String::new(),
            cache_patterns_csv: String::new(),
            cache_by_default: true,
            cache_meta_tag: crate::cache_rules::DEFAULT_CACHE_META_TAG.to_string(),
            min_pool_size: 2,
            max_pool_size: 10,
            shutdown_timeout_secs: 30,
            observability_channel_capacity: 1024,
            bot_rules: None,
            _phantom: PhantomData,
        }
    }
}

impl ProxyConfigBuilder<Unset> {
    #[must_use]
    pub fn target_url(self, url: impl Into<String>) -> ProxyConfigBuilder<WithTargetUrl> {
        ProxyConfigBuilder {
            target_url: Some(url.into()),
            port: self.port,
            cache_ttl_secs: self.cache_ttl_secs,
            cache_type: self.cache_type,
            cache_endpoint: self.cache_endpoint,
            puppeteer_timeout_ms: self.puppeteer_timeout_ms,
            max_concurrent_renders: self.max_concurrent_renders,
            no_cache_patterns_csv: self.no_cache_patterns_csv,
            cache_patterns_csv: self.cache_patterns_csv,
            cache_by_default: self.cache_by_default,
            cache_meta_tag: self.cache_meta_tag,
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            shutdown_timeout_secs: self.shutdown_timeout_secs,
            observability_channel_capacity: self.observability_channel_capacity,
            bot_rules: self.bot_rules,
            _phantom: PhantomData,
        }
    }
}

impl ProxyConfigBuilder<WithTargetUrl> {
    /// # Errors
    /// Returns a `ConfigError` if `target_url` fails to parse or either
    /// pattern list contains an invalid entry.
    pub fn build(self) -> Result<ProxyConfig, ConfigError> {
        let target_url = Url::parse(
            self.target_url
                .as_deref()
                .ok_or(ConfigError::MissingRequired("TARGET_URL"))?,
        )
        .map_err(|e| ConfigError::Invalid {
            field: "TARGET_URL",
            reason: e.to_string(),
        })?;

        let no_cache_patterns = compile_pattern_list(&self.no_cache_patterns_csv)?;
        let cache_patterns = compile_pattern_list(&self.cache_patterns_csv)?;
        let cache_meta_tag = crate::cache_rules::validate_meta_tag_name(&self.cache_meta_tag);

        Ok(ProxyConfig {
            port: self.port,
            target_url,
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            cache_type: self.cache_type,
            cache_endpoint: self.cache_endpoint,
            puppeteer_timeout: Duration::from_millis(self.puppeteer_timeout_ms),
            max_concurrent_renders: self.max_concurrent_renders,
            no_cache_patterns,
            cache_patterns,
            cache_by_default: self.cache_by_default,
            cache_meta_tag,
            min_pool_size: self.min_pool_size,
            max_pool_size: self.max_pool_size,
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            observability_channel_capacity: self.observability_channel_capacity,
            bot_rules: self.bot_rules.unwrap_or_else(default_registry),
            blocked_domains: DEFAULT_BLOCKED_DOMAINS.iter().map(|s| (*s).to_string()).collect(),
            blocked_path_substrings: DEFAULT_BLOCKED_PATH_SUBSTRINGS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        })
    }
}

// Builder methods usable regardless of typestate (all optional fields).
impl<State> ProxyConfigBuilder<State> {
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.cache_ttl_secs = secs;
        self
    }

    #[must_use]
    pub fn cache_type(mut self, kind: CacheBackendKind) -> Self {
        self.cache_type = kind;
        self
    }

    #[must_use]
    pub fn cache_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.cache_endpoint = endpoint;
        self
    }

    #[must_use]
    pub fn puppeteer_timeout_ms(mut self, ms: u64) -> Self {
        self.puppeteer_timeout_ms = ms;
        self
    }

    #[must_use]
    pub fn max_concurrent_renders(mut self, n: usize) -> Self {
        self.max_concurrent_renders = n;
        self
    }

    #[must_use]
    pub fn no_cache_patterns_csv(mut self, csv: impl Into<String>) -> Self {
        self.no_cache_patterns_csv = csv.into();
        self
    }

    #[must_use]
    pub fn cache_patterns_csv(mut self, csv: impl Into<String>) -> Self {
        self.cache_patterns_csv = csv.into();
        self
    }

    #[must_use]
    pub fn cache_by_default(mut self, value: bool) -> Self {
        self.cache_by_default = value;
        self
    }

    #[must_use]
    pub fn cache_meta_tag(mut self, tag: impl Into<String>) -> Self {
        self.cache_meta_tag = tag.into();
        self
    }

    #[must_use]
    pub fn min_pool_size(mut self, n: usize) -> Self {
        self.min_pool_size = n;
        self
    }

    #[must_use]
    pub fn max_pool_size(mut self, n: usize) -> Self {
        self.max_pool_size = n;
        self
    }

    #[must_use]
    pub fn shutdown_timeout_secs(mut self, secs: u64) -> Self {
        self.shutdown_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn observability_channel_capacity(mut self, n: usize) -> Self {
        self.observability_channel_capacity = n;
        self
    }

    /// Overrides the default bot-rule registry. Primarily used in tests;
    /// production callers leave this unset to get `default_registry()`.
    #[must_use]
    pub fn bot_rules(mut self, rules: Vec<BotRule>) -> Self {
        self.bot_rules = Some(rules);
        self
    }
}

impl ProxyConfig {
    #[must_use]
    pub fn builder() -> ProxyConfigBuilder<Unset> {
        ProxyConfigBuilder::default()
    }
}
