//! Request fingerprint canonicalization.
//!
//! The fingerprint is the joint cache key and single-flight key: scheme,
//! lowercased host, path (trailing slash stripped except for root), and the
//! query string with the reserved render-control keys (`render`, `_render`)
//! removed but the remaining keys left in their original order.
//!
//! Grounded on the reference crate's `normalize_url_for_cache_matching` in
//! `content_saver/cache_check.rs`, generalized from "strip query entirely"
//! to "strip only the render-control keys".

use std::fmt;

use url::Url;

pub const RENDER_CONTROL_KEYS: [&str; 2] = ["render", "_render"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderControl {
    Preview,
    True,
    Debug,
}

impl RenderControl {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "preview" => Some(Self::Preview),
            "true" => Some(Self::True),
            "debug" => Some(Self::Debug),
            _ => None,
        }
    }

    pub fn forces_render(self) -> bool {
        matches!(self, Self::Preview | Self::True | Self::Debug)
    }

    pub fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }
}

/// Canonicalized URL used as both cache key and single-flight key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Fingerprint {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Fingerprint {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Parses the incoming request URL, extracts any render-control directive,
/// and returns both the fingerprint (render-control keys stripped) and the
/// directive so the router can still act on it for the current request.
#[must_use]
pub fn canonicalize(absolute_url: &Url) -> (Fingerprint, Option<RenderControl>) {
    let mut url = absolute_url.clone();

    let mut control = None;
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, v)| {
            if RENDER_CONTROL_KEYS.contains(&k.as_ref()) {
                if control.is_none() {
                    control = RenderControl::parse(v.as_ref());
                }
                false
            } else {
                true
            }
        })
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        let qs = retained
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        url.set_query(Some(&qs));
    }

    url.set_fragment(None);
    if let Some(host) = url.host_str() {
        let lower = host.to_ascii_lowercase();
        let _ = url.set_host(Some(&lower));
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/').to_string();
        url.set_path(&trimmed);
    }

    (Fingerprint(url.to_string()), control)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn strips_render_control_params_only() {
        let (fp, ctrl) = canonicalize(&u("https://example.com/product/42?render=debug&utm=abc"));
        assert_eq!(fp.as_str(), "https://example.com/product/42?utm=abc");
        assert_eq!(ctrl, Some(RenderControl::Debug));
    }

    #[test]
    fn identical_urls_share_fingerprint_regardless_of_render_control() {
        let (a, _) = canonicalize(&u("https://example.com/product/42?render=true"));
        let (b, _) = canonicalize(&u("https://example.com/product/42?_render=preview"));
        let (c, _) = canonicalize(&u("https://example.com/product/42"));
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn lowercases_host_and_strips_trailing_slash() {
        let (fp, _) = canonicalize(&u("https://Example.COM/foo/"));
        assert_eq!(fp.as_str(), "https://example.com/foo");
    }

    #[test]
    fn preserves_root_path() {
        let (fp, _) = canonicalize(&u("https://example.com/"));
        assert_eq!(fp.as_str(), "https://example.com/");
    }

    #[test]
    fn strips_fragment() {
        let (fp, _) = canonicalize(&u("https://example.com/page#section"));
        assert_eq!(fp.as_str(), "https://example.com/page");
    }
}
