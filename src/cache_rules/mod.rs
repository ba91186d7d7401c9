//! Cache-Rule Engine — pure functions deciding renderability and
//! cacheability from a URL and, optionally, the rendered HTML.
//!
//! Pattern compilation follows the reference crate's
//! `config::builder::compile_glob_pattern`: a `*` wildcard becomes `.*`,
//! anchored with `^...$`. A slash-delimited entry (`/…/`) is treated as a
//! raw regex body instead of a glob.

use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_CACHE_META_TAG: &str = "x-seo-shield-cache";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheRuleDecision {
    pub should_render: bool,
    pub should_cache: bool,
    pub reason: String,
}

/// One compiled pattern-list entry.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub source: String,
    pub regex: Regex,
}

/// Compiles a single entry of a `NO_CACHE_PATTERNS`/`CACHE_PATTERNS` list.
///
/// # Errors
/// Returns an error if the resulting regex fails to compile.
pub fn compile_pattern(pattern: &str) -> Result<CompiledPattern, ConfigError> {
    let body = if let Some(inner) = pattern
        .strip_prefix('/')
        .and_then(|s| s.strip_suffix('/'))
    {
        inner.to_string()
    } else {
        format!("^{}$", pattern.replace('*', ".*"))
    };

    let regex = Regex::new(&body).map_err(|e| ConfigError::Invalid {
        field: "cache pattern",
        reason: format!("invalid pattern '{pattern}': {e}"),
    })?;

    Ok(CompiledPattern {
        source: pattern.to_string(),
        regex,
    })
}

/// Compiles an ordered CSV pattern list as it arrives from the environment.
///
/// # Errors
/// Returns an error on the first pattern that fails to compile.
pub fn compile_pattern_list(csv: &str) -> Result<Vec<CompiledPattern>, ConfigError> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(compile_pattern)
        .collect()
}

/// `decideByUrl(url) -> {shouldRender, shouldCache, reason}`
#[must_use]
pub fn decide_by_url(
    path_and_query: &str,
    no_cache: &[CompiledPattern],
    cache: &[CompiledPattern],
    default_cache: bool,
) -> CacheRuleDecision {
    if let Some(p) = no_cache.iter().find(|p| p.regex.is_match(path_and_query)) {
        return CacheRuleDecision {
            should_render: false,
            should_cache: false,
            reason: format!("NO_CACHE pattern match ({}) - proxy only", p.source),
        };
    }

    if let Some(p) = cache.iter().find(|p| p.regex.is_match(path_and_query)) {
        return CacheRuleDecision {
            should_render: true,
            should_cache: true,
            reason: format!("CACHE pattern match ({})", p.source),
        };
    }

    if !cache.is_empty() {
        return CacheRuleDecision {
            should_render: true,
            should_cache: default_cache,
            reason: "no CACHE pattern matched - default cacheability applied".to_string(),
        };
    }

    CacheRuleDecision {
        should_render: true,
        should_cache: default_cache,
        reason: "no pattern lists configured - default cacheability applied".to_string(),
    }
}

/// `decideByHtml(html) -> overrideCacheable` — scans for the configured
/// meta-tag override. `false` forces `shouldCache: false`; `true` or
/// absence leaves the URL decision intact.
#[must_use]
pub fn decide_by_html(html: &str, meta_tag_name: &str) -> bool {
    let Ok(selector) = Selector::parse("meta") else {
        return true;
    };
    let doc = Html::parse_document(html);

    for el in doc.select(&selector) {
        let name = el.value().attr("name");
        if name == Some(meta_tag_name) {
            match el.value().attr("content") {
                Some("false") => return false,
                _ => return true,
            }
        }
    }
    true
}

/// Validates a meta-tag name against `[A-Za-z0-9_-]+`; falls back to the
/// default name on mismatch.
#[must_use]
pub fn validate_meta_tag_name(name: &str) -> String {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        name.to_string()
    } else {
        DEFAULT_CACHE_META_TAG.to_string()
    }
}

/// Composite `decide(url, html?)`.
#[must_use]
pub fn decide(
    path_and_query: &str,
    no_cache: &[CompiledPattern],
    cache: &[CompiledPattern],
    default_cache: bool,
    html: Option<&str>,
    meta_tag_name: &str,
) -> CacheRuleDecision {
    let mut decision = decide_by_url(path_and_query, no_cache, cache, default_cache);
    if decision.should_cache {
        if let Some(html) = html
            && !decide_by_html(html, meta_tag_name)
        {
            decision.should_cache = false;
            decision.reason = format!("{} (overridden by HTML meta tag)", decision.reason);
        }
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_cache_precedence_over_cache() {
        let no_cache = compile_pattern_list("/admin/*").unwrap();
        let cache = compile_pattern_list("/admin/dashboard").unwrap();
        let d = decide_by_url("/admin/dashboard", &no_cache, &cache, true);
        assert!(!d.should_render);
        assert!(!d.should_cache);
    }

    #[test]
    fn render_implies_cache_invariant_never_violated() {
        for (no_cache, cache, path) in [
            ("/admin/*", "", "/admin/x"),
            ("", "/blog/*", "/blog/post-1"),
            ("", "", "/anything"),
        ] {
            let nc = compile_pattern_list(no_cache).unwrap();
            let c = compile_pattern_list(cache).unwrap();
            let d = decide_by_url(path, &nc, &c, true);
            if !d.should_render {
                assert!(!d.should_cache);
            }
        }
    }

    #[test]
    fn empty_lists_use_default_cacheability() {
        let d = decide_by_url("/foo", &[], &[], false);
        assert!(d.should_render);
        assert!(!d.should_cache);
    }

    #[test]
    fn regex_entry_delimited_by_slashes() {
        let no_cache = compile_pattern_list("/^/api/v[0-9]+/$/").unwrap();
        let d = decide_by_url("/api/v2/", &no_cache, &[], true);
        assert!(!d.should_render);
    }

    #[test]
    fn html_override_false_forces_no_cache() {
        let html = r#"<html><head><meta name="x-seo-shield-cache" content="false"></head></html>"#;
        assert!(!decide_by_html(html, "x-seo-shield-cache"));
    }

    #[test]
    fn html_override_absent_leaves_decision_intact() {
        let html = "<html><head></head></html>";
        assert!(decide_by_html(html, "x-seo-shield-cache"));
    }

    #[test]
    fn invalid_meta_tag_name_falls_back_to_default() {
        assert_eq!(validate_meta_tag_name("bad name!"), DEFAULT_CACHE_META_TAG);
        assert_eq!(validate_meta_tag_name("my-tag_1"), "my-tag_1");
    }

    #[test]
    fn decide_is_pure_and_deterministic() {
        let no_cache = compile_pattern_list("/admin/*").unwrap();
        let cache = compile_pattern_list("").unwrap();
        let a = decide("/product/1", &no_cache, &cache, true, None, "x-seo-shield-cache");
        let b = decide("/product/1", &no_cache, &cache, true, None, "x-seo-shield-cache");
        assert_eq!(a, b);
    }
}
