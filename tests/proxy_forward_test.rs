//! Transparent Proxy — §4.7 integration tests against a mock origin.

use axum::body::Body;
use axum::http::{HeaderMap, Method, Uri};
use seo_shield_proxy::proxy::TransparentProxy;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn proxy_for(server: &MockServer) -> TransparentProxy {
    let target_url = url::Url::parse(&server.uri()).unwrap();
    TransparentProxy::new(target_url).unwrap()
}

#[tokio::test]
async fn forwards_method_path_and_body_to_origin() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/widgets/42"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>widget</html>"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server);
    let uri: Uri = "/widgets/42".parse().unwrap();
    let resp = proxy
        .forward(Method::GET, &uri, &HeaderMap::new(), Body::empty())
        .await;

    assert_eq!(resp.status(), 200);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"<html>widget</html>");
}

#[tokio::test]
async fn propagates_origin_status_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("not found"))
        .mount(&server)
        .await;

    let proxy = proxy_for(&server);
    let uri: Uri = "/missing".parse().unwrap();
    let resp = proxy
        .forward(Method::GET, &uri, &HeaderMap::new(), Body::empty())
        .await;

    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn strips_hop_by_hop_headers_from_origin_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("connection", "close")
                .insert_header("x-custom", "value"),
        )
        .mount(&server)
        .await;

    let proxy = proxy_for(&server);
    let uri: Uri = "/".parse().unwrap();
    let resp = proxy
        .forward(Method::GET, &uri, &HeaderMap::new(), Body::empty())
        .await;

    assert_eq!(resp.status(), 200);
    assert!(!resp.headers().contains_key("connection"));
    assert!(resp.headers().contains_key("x-custom"));
}

#[tokio::test]
async fn unreachable_origin_yields_bad_gateway() {
    // Port 1 is reserved and nothing will ever be listening there.
    let target_url = url::Url::parse("http://127.0.0.1:1").unwrap();
    let proxy = TransparentProxy::new(target_url).unwrap();

    let uri: Uri = "/anything".parse().unwrap();
    let resp = proxy
        .forward(Method::GET, &uri, &HeaderMap::new(), Body::empty())
        .await;

    assert_eq!(resp.status(), 502);
}
