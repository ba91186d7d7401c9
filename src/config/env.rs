//! Loads `ProxyConfig` from the process environment per §6's table.

use super::builder::ProxyConfigBuilder;
use super::types::{CacheBackendKind, ProxyConfig};
use crate::error::ConfigError;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match env_string(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            field: leak(key),
            reason: format!("could not parse '{raw}'"),
        }),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env_string(key) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid {
                field: leak(key),
                reason: format!("'{raw}' is not a boolean"),
            }),
        },
    }
}

// Keys are all 'static string literals in practice; this sidesteps
// ConfigError::Invalid wanting a &'static str field name without
// introducing an owned-String variant used nowhere else.
fn leak(key: &str) -> &'static str {
    match key {
        "PORT" => "PORT",
        "CACHE_TTL" => "CACHE_TTL",
        "CACHE_TYPE" => "CACHE_TYPE",
        "PUPPETEER_TIMEOUT" => "PUPPETEER_TIMEOUT",
        "MAX_CONCURRENT_RENDERS" => "MAX_CONCURRENT_RENDERS",
        "CACHE_BY_DEFAULT" => "CACHE_BY_DEFAULT",
        "MIN_POOL_SIZE" => "MIN_POOL_SIZE",
        "MAX_POOL_SIZE" => "MAX_POOL_SIZE",
        "SHUTDOWN_TIMEOUT" => "SHUTDOWN_TIMEOUT",
        "OBSERVABILITY_CHANNEL_CAPACITY" => "OBSERVABILITY_CHANNEL_CAPACITY",
        _ => "environment variable",
    }
}

/// Loads and validates `ProxyConfig` from `std::env`.
///
/// # Errors
/// Returns `ConfigError::MissingRequired` if `TARGET_URL` is unset, or
/// `ConfigError::Invalid` if any value fails to parse. This is the only
/// error class that aborts the process (§7).
pub fn load() -> Result<ProxyConfig, ConfigError> {
    let target_url = env_string("TARGET_URL").ok_or(ConfigError::MissingRequired("TARGET_URL"))?;

    let cache_type = match env_string("CACHE_TYPE").as_deref() {
        None | Some("local") => CacheBackendKind::Local,
        Some("remote") => CacheBackendKind::Remote,
        Some(other) => {
            return Err(ConfigError::Invalid {
                field: "CACHE_TYPE",
                reason: format!("expected 'local' or 'remote', got '{other}'"),
            });
        }
    };

    let builder = ProxyConfigBuilder::default()
        .target_url(target_url)
        .port(env_parse("PORT", 8080u16)?)
        .cache_ttl_secs(env_parse("CACHE_TTL", 3600u64)?)
        .cache_type(cache_type)
        .cache_endpoint(env_string("CACHE_ENDPOINT"))
        .puppeteer_timeout_ms(env_parse("PUPPETEER_TIMEOUT", 30_000u64)?)
        .max_concurrent_renders(env_parse("MAX_CONCURRENT_RENDERS", 5usize)?)
        .no_cache_patterns_csv(env_string("NO_CACHE_PATTERNS").unwrap_or_default())
        .cache_patterns_csv(env_string("CACHE_PATTERNS").unwrap_or_default())
        .cache_by_default(env_bool("CACHE_BY_DEFAULT", true)?)
        .cache_meta_tag(
            env_string("CACHE_META_TAG")
                .unwrap_or_else(|| crate::cache_rules::DEFAULT_CACHE_META_TAG.to_string()),
        )
        .min_pool_size(env_parse("MIN_POOL_SIZE", 2usize)?)
        .max_pool_size(env_parse("MAX_POOL_SIZE", 10usize)?)
        .shutdown_timeout_secs(env_parse("SHUTDOWN_TIMEOUT", 30u64)?)
        .observability_channel_capacity(env_parse("OBSERVABILITY_CHANNEL_CAPACITY", 1024usize)?);

    let config = builder.build()?;

    if config.cache_type() == CacheBackendKind::Remote && config.cache_endpoint().is_none() {
        return Err(ConfigError::Invalid {
            field: "CACHE_ENDPOINT",
            reason: "required when CACHE_TYPE=remote".to_string(),
        });
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_target_url_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe { std::env::remove_var("TARGET_URL") };
        let result = load();
        assert!(matches!(result, Err(ConfigError::MissingRequired("TARGET_URL"))));
    }

    #[test]
    fn remote_cache_without_endpoint_is_fatal() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            std::env::set_var("TARGET_URL", "https://example.com");
            std::env::set_var("CACHE_TYPE", "remote");
            std::env::remove_var("CACHE_ENDPOINT");
        }
        let result = load();
        unsafe {
            std::env::remove_var("TARGET_URL");
            std::env::remove_var("CACHE_TYPE");
        }
        assert!(result.is_err());
    }
}
