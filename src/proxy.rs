//! Transparent Proxy — §4.7.
//!
//! Forwards the inbound request to the configured origin verbatim (method,
//! headers, query, body) and streams the response back without buffering it
//! fully in memory, using `reqwest`'s streaming body support the way the
//! render path uses `chromiumoxide` for rendered traffic.

use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use reqwest::redirect::Policy;
use tracing::warn;
use url::Url;

use crate::error::ProxyError;

/// Headers that are connection-scoped, not end-to-end, and must never be
/// copied across the proxy boundary in either direction.
const HOP_BY_HOP: [&str; 5] = [
    "connection",
    "transfer-encoding",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
];

pub struct TransparentProxy {
    client: reqwest::Client,
    target_url: Url,
}

impl TransparentProxy {
    /// # Errors
    /// Returns a `ProxyError` only if the underlying `reqwest::Client`
    /// fails to build (e.g. invalid TLS configuration).
    pub fn new(target_url: Url) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ProxyError::Dial)?;
        Ok(Self { client, target_url })
    }

    /// Forwards `method`/`uri`/`headers`/`body` to the configured origin and
    /// returns the origin's response as a streamed axum `Response`. Never
    /// panics; a dial failure becomes a 502 with a short textual body.
    pub async fn forward(&self, method: Method, uri: &Uri, headers: &HeaderMap, body: Body) -> Response {
        let mut origin_url = self.target_url.clone();
        origin_url.set_path(uri.path());
        origin_url.set_query(uri.query());

        let reqwest_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
            Ok(m) => m,
            Err(_) => return bad_gateway("invalid HTTP method"),
        };

        let body_bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "failed to buffer inbound body for proxying");
                return bad_gateway("failed to read request body");
            }
        };

        let mut request = self.client.request(reqwest_method, origin_url.as_str());
        for (name, value) in headers {
            if is_hop_by_hop(name) || *name == axum::http::header::HOST {
                continue;
            }
            if let Ok(value_str) = value.to_str() {
                request = request.header(name.as_str(), value_str);
            }
        }
        request = request
            .header("X-Forwarded-Host", origin_url.host_str().unwrap_or_default())
            .header("X-Forwarded-Proto", origin_url.scheme())
            .body(body_bytes);

        let origin_response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(error = %e, url = %origin_url, "transparent proxy failed to reach origin");
                return bad_gateway("upstream unreachable");
            }
        };

        let status = origin_response.status();
        let mut builder = Response::builder().status(status.as_u16());
        for (name, value) in origin_response.headers() {
            if is_hop_by_hop(name) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                axum::http::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                builder = builder.header(name, value);
            }
        }

        let stream = origin_response.bytes_stream();
        builder
            .body(Body::from_stream(stream))
            .unwrap_or_else(|_| bad_gateway("failed to build proxied response"))
    }
}

fn is_hop_by_hop(name: &reqwest::header::HeaderName) -> bool {
    HOP_BY_HOP.iter().any(|h| name.as_str().eq_ignore_ascii_case(h))
}

fn bad_gateway(message: &str) -> Response {
    (StatusCode::BAD_GATEWAY, message.to_string()).into_response()
}
