//! Page Renderer — §4.6.
//!
//! Drives a single browser context through navigation, resource-blocking
//! interception, and soft-404 detection. One `PageRenderer::render_once`
//! call is exactly one Render Job's `Running` phase; the scheduler decides
//! when a job runs, this module decides how.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EventRequestPaused, FailRequestParams, FulfillRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::browser_pool::BrowserPool;
use crate::browser_setup::apply_stealth_measures;
use crate::error::RenderError;

/// Declared to the origin (HTTP header) and to in-page JS (`navigator.userAgent`)
/// alike — the renderer identifies itself rather than impersonating a browser.
pub const RENDERER_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; SeoShieldProxy/1.0; +https://github.com/seo-shield-proxy) Chrome/132.0.0.0 Safari/537.36";

const IDLE_SETTLE: Duration = Duration::from_millis(500);
const TIER3_SETTLE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const SOFT_404_TITLE_TOKENS: [&str; 3] = ["404", "not found", "page not found"];
const SOFT_404_BODY_PHRASES: [&str; 3] = [
    "the page you are looking for",
    "nothing found",
    "this page cannot be found",
];
const SOFT_404_SELECTORS: [&str; 4] = [".error-404", "#error-404", ".not-found", "[class*=not-found]"];
const SOFT_404_MIN_WORD_COUNT: usize = 50;

/// Outcome of one render job, handed back to the scheduler and on to the router.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub body: String,
    pub status: u16,
    pub blocked: u32,
    pub allowed: u32,
    pub duration_ms: u64,
}

pub struct PageRenderer {
    pool: Arc<BrowserPool>,
    blocked_domains: Arc<Vec<String>>,
    blocked_path_substrings: Arc<Vec<String>>,
    puppeteer_timeout: Duration,
}

#[derive(Deserialize, Default)]
struct SoftNotFoundSignals {
    status_code: Option<u16>,
    title: String,
    headings: Vec<String>,
    body_text: String,
    word_count: usize,
    selector_hit: bool,
}

const SOFT_404_SCRIPT: &str = r#"
(() => {
    const meta = document.querySelector('meta[name="prerender-status-code"]');
    const statusCode = meta ? parseInt(meta.getAttribute('content'), 10) : null;
    const headings = Array.from(document.querySelectorAll('h1, h2')).map(el => el.textContent || '');
    const bodyText = document.body ? (document.body.innerText || '') : '';
    const wordCount = bodyText.trim().length === 0 ? 0 : bodyText.trim().split(/\s+/).length;
    const selectorHit = [".error-404", "#error-404", ".not-found", "[class*=not-found]"]
        .some(sel => { try { return document.querySelector(sel) !== null; } catch (e) { return false; } });
    return {
        status_code: (Number.isFinite(statusCode) && statusCode >= 100 && statusCode < 600) ? statusCode : null,
        title: document.title || '',
        headings,
        body_text: bodyText,
        word_count: wordCount,
        selector_hit: selectorHit,
    };
})()
"#;

impl PageRenderer {
    #[must_use]
    pub fn new(
        pool: Arc<BrowserPool>,
        blocked_domains: Vec<String>,
        blocked_path_substrings: Vec<String>,
        puppeteer_timeout: Duration,
    ) -> Self {
        Self {
            pool,
            blocked_domains: Arc::new(blocked_domains),
            blocked_path_substrings: Arc::new(blocked_path_substrings),
            puppeteer_timeout,
        }
    }

    /// Renders `url` once: fresh context, resource blocking, three-tier
    /// navigation fallback, status extraction, soft-404 detection.
    pub async fn render_once(&self, url: &Url) -> Result<RenderOutcome, RenderError> {
        let started = Instant::now();
        let deadline = started + self.puppeteer_timeout;

        let guard = self
            .pool
            .acquire()
            .await
            .map_err(|e| RenderError::PoolUnavailable(e.to_string()))?;

        let page = guard
            .browser_arc()
            .new_page("about:blank")
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;

        apply_stealth_measures(&page)
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;

        let blocked = Arc::new(AtomicU32::new(0));
        let allowed = Arc::new(AtomicU32::new(0));
        let inflight = Arc::new(AtomicI64::new(0));

        let intercept_handle = self.spawn_interceptor(&page, blocked.clone(), allowed.clone());
        let tracking_handle = self.spawn_inflight_tracker(&page, inflight.clone());

        let nav_result = self
            .navigate_with_fallback(&page, url, deadline, &inflight)
            .await;

        intercept_handle.abort();
        tracking_handle.abort();

        nav_result?;

        let body = page
            .content()
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;

        let signals = self.extract_soft_404_signals(&page).await;
        let status = resolve_status(&signals);

        Ok(RenderOutcome {
            body,
            status,
            blocked: blocked.load(Ordering::Relaxed),
            allowed: allowed.load(Ordering::Relaxed),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Subscribes to the CDP Fetch domain and drops sub-requests that match
    /// the resource-blocking policy (§4.6). Continues everything else.
    fn spawn_interceptor(
        &self,
        page: &chromiumoxide::Page,
        blocked: Arc<AtomicU32>,
        allowed: Arc<AtomicU32>,
    ) -> tokio::task::JoinHandle<()> {
        let blocked_domains = self.blocked_domains.clone();
        let blocked_path_substrings = self.blocked_path_substrings.clone();
        let page = page.clone();

        tokio::spawn(async move {
            let Ok(mut events) = page.event_listener::<EventRequestPaused>().await else {
                return;
            };
            while let Some(event) = events.next().await {
                let request_url = &event.request.url;
                let resource_type = format!("{:?}", event.resource_type).to_ascii_lowercase();

                let drop_it = crate::config::BLOCKED_RESOURCE_TYPES
                    .contains(&resource_type.as_str())
                    || host_blacklisted(request_url, &blocked_domains)
                    || path_blacklisted(request_url, &blocked_path_substrings);

                if drop_it {
                    blocked.fetch_add(1, Ordering::Relaxed);
                    let _ = page
                        .execute(FailRequestParams::new(
                            event.request_id.clone(),
                            ErrorReason::BlockedByClient,
                        ))
                        .await;
                } else {
                    allowed.fetch_add(1, Ordering::Relaxed);
                    let _ = page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await;
                }
            }
        })
    }

    /// Maintains an in-flight sub-request counter from the Network domain,
    /// used by the navigation fallback tiers to detect "idle".
    fn spawn_inflight_tracker(
        &self,
        page: &chromiumoxide::Page,
        inflight: Arc<AtomicI64>,
    ) -> tokio::task::JoinHandle<()> {
        let page_sent = page.clone();
        let page_fin = page.clone();
        let page_fail = page.clone();
        let inc = inflight.clone();
        let dec_fin = inflight.clone();
        let dec_fail = inflight.clone();

        tokio::spawn(async move {
            let sent = page_sent.event_listener::<EventRequestWillBeSent>().await;
            let finished = page_fin.event_listener::<EventLoadingFinished>().await;
            let failed = page_fail.event_listener::<EventLoadingFailed>().await;

            let (Ok(mut sent), Ok(mut finished), Ok(mut failed)) = (sent, finished, failed) else {
                return;
            };

            loop {
                tokio::select! {
                    ev = sent.next() => {
                        if ev.is_some() {
                            inc.fetch_add(1, Ordering::Relaxed);
                        } else {
                            break;
                        }
                    }
                    ev = finished.next() => {
                        if ev.is_some() {
                            dec_fin.fetch_sub(1, Ordering::Relaxed);
                        } else {
                            break;
                        }
                    }
                    ev = failed.next() => {
                        if ev.is_some() {
                            dec_fail.fetch_sub(1, Ordering::Relaxed);
                        } else {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Three-tier navigation: networkidle0 → networkidle2 → domcontentloaded+settle.
    async fn navigate_with_fallback(
        &self,
        page: &chromiumoxide::Page,
        url: &Url,
        deadline: Instant,
        inflight: &Arc<AtomicI64>,
    ) -> Result<(), RenderError> {
        page.goto(url.as_str())
            .await
            .map_err(|e| RenderError::Protocol(e.to_string()))?;

        if wait_for_network_idle(inflight, 0, IDLE_SETTLE, deadline)
            .await
            .is_ok()
        {
            return Ok(());
        }

        debug!(url = %url, "networkidle0 did not settle, falling back to networkidle2");
        if wait_for_network_idle(inflight, 2, IDLE_SETTLE, deadline)
            .await
            .is_ok()
        {
            return Ok(());
        }

        warn!(url = %url, "networkidle2 did not settle, falling back to domcontentloaded+settle");
        if Instant::now() >= deadline {
            return Err(RenderError::Timeout(self.puppeteer_timeout));
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::timeout(remaining.min(TIER3_SETTLE * 2), page.wait_for_navigation())
            .await
            .map_err(|_| RenderError::Timeout(self.puppeteer_timeout))?
            .map_err(|e| RenderError::Protocol(e.to_string()))?;
        tokio::time::sleep(TIER3_SETTLE).await;
        Ok(())
    }

    async fn extract_soft_404_signals(&self, page: &chromiumoxide::Page) -> SoftNotFoundSignals {
        let Ok(js_result) = page.evaluate(SOFT_404_SCRIPT).await else {
            return SoftNotFoundSignals::default();
        };
        js_result
            .into_value::<SoftNotFoundSignals>()
            .unwrap_or_default()
    }
}

/// Polls the in-flight counter until it stays `<= max_inflight` for
/// `idle_for`, or the deadline passes.
async fn wait_for_network_idle(
    inflight: &Arc<AtomicI64>,
    max_inflight: i64,
    idle_for: Duration,
    deadline: Instant,
) -> Result<(), ()> {
    let mut idle_since: Option<Instant> = None;
    loop {
        if Instant::now() >= deadline {
            return Err(());
        }
        let count = inflight.load(Ordering::Relaxed);
        if count <= max_inflight {
            let since = idle_since.get_or_insert_with(Instant::now);
            if since.elapsed() >= idle_for {
                return Ok(());
            }
        } else {
            idle_since = None;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn host_blacklisted(request_url: &str, blocked_domains: &[String]) -> bool {
    let Ok(parsed) = Url::parse(request_url) else {
        return false;
    };
    let Some(host) = parsed.host_str() else {
        return false;
    };
    blocked_domains
        .iter()
        .any(|domain| host == domain.as_str() || host.ends_with(&format!(".{domain}")))
}

fn path_blacklisted(request_url: &str, blocked_path_substrings: &[String]) -> bool {
    blocked_path_substrings
        .iter()
        .any(|needle| request_url.contains(needle.as_str()))
}

/// §4.6: explicit `<meta name="prerender-status-code">` wins; otherwise fall
/// back to soft-404 heuristics; otherwise 200.
fn resolve_status(signals: &SoftNotFoundSignals) -> u16 {
    if let Some(code) = signals.status_code {
        return code;
    }
    if is_soft_404(signals) {
        return 404;
    }
    200
}

fn is_soft_404(signals: &SoftNotFoundSignals) -> bool {
    let title_lower = signals.title.to_ascii_lowercase();
    let title_hit = SOFT_404_TITLE_TOKENS
        .iter()
        .any(|token| title_lower.contains(token));

    let heading_hit = signals.headings.iter().any(|h| {
        let lower = h.to_ascii_lowercase();
        SOFT_404_TITLE_TOKENS.iter().any(|token| lower.contains(token))
    });

    let body_lower = signals.body_text.to_ascii_lowercase();
    let phrase_hit = SOFT_404_BODY_PHRASES
        .iter()
        .any(|phrase| body_lower.contains(phrase));

    let selector_hit = signals.selector_hit;

    let thin_with_404_token =
        signals.word_count < SOFT_404_MIN_WORD_COUNT && (title_hit || heading_hit);

    title_hit || heading_hit || phrase_hit || selector_hit || thin_with_404_token
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signals(title: &str, body: &str, word_count: usize) -> SoftNotFoundSignals {
        SoftNotFoundSignals {
            status_code: None,
            title: title.to_string(),
            headings: Vec::new(),
            body_text: body.to_string(),
            word_count,
            selector_hit: false,
        }
    }

    #[test]
    fn explicit_status_code_wins_over_everything() {
        let mut s = signals("404 Not Found", "gone", 3);
        s.status_code = Some(410);
        assert_eq!(resolve_status(&s), 410);
    }

    #[test]
    fn title_token_triggers_soft_404() {
        let s = signals("404 - Page Not Found", "lots of words here to pad it out ".repeat(20).as_str(), 200);
        assert_eq!(resolve_status(&s), 404);
    }

    #[test]
    fn body_phrase_triggers_soft_404() {
        let s = signals(
            "Oops",
            "Sorry, the page you are looking for does not exist.",
            8,
        );
        assert_eq!(resolve_status(&s), 404);
    }

    #[test]
    fn thin_page_without_404_token_is_not_flagged() {
        let s = signals("Loading...", "please wait", 2);
        assert_eq!(resolve_status(&s), 200);
    }

    #[test]
    fn ordinary_page_is_200() {
        let s = signals(
            "Welcome",
            "this is a perfectly normal page with plenty of content ".repeat(10).as_str(),
            80,
        );
        assert_eq!(resolve_status(&s), 200);
    }

    #[test]
    fn host_blacklist_matches_subdomains() {
        let domains = vec!["doubleclick.net".to_string()];
        assert!(host_blacklisted("https://stats.doubleclick.net/x", &domains));
        assert!(host_blacklisted("https://doubleclick.net/x", &domains));
        assert!(!host_blacklisted("https://example.com/x", &domains));
    }

    #[test]
    fn path_blacklist_matches_substring() {
        let paths = vec!["/analytics".to_string()];
        assert!(path_blacklisted("https://example.com/js/analytics/track.js", &paths));
        assert!(!path_blacklisted("https://example.com/app.js", &paths));
    }
}
