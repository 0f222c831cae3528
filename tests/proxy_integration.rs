//! Integration tests for the reverse proxy against a mock upstream.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use portal_core::proxy::{self, ProxyConfig, ProxyState};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

mod support;
use support::socket_guard::{start_mock_server_or_skip, unused_local_addr};

fn app(upstream: &str) -> axum::Router {
    let config = ProxyConfig::new(upstream, "/api").expect("valid upstream");
    proxy::router(ProxyState::new(config).expect("proxy state"))
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn test_forwards_path_query_and_forwarding_headers() {
    let Some(upstream) = start_mock_server_or_skip().await else {
        return;
    };
    let upstream_host = upstream.address().to_string();
    Mock::given(method("GET"))
        .and(path("/users/42"))
        .and(query_param("expand", "roles"))
        .and(header("host", upstream_host.as_str()))
        .and(header("x-forwarded-host", "www.company.test"))
        .and(header("x-forwarded-proto", "http"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"code": 0, "data": {"id": 42}, "message": ""}))
                .insert_header("x-request-id", "r-1"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let response = app(&upstream.uri())
        .oneshot(
            Request::get("/api/users/42?expand=roles")
                .header("host", "www.company.test")
                .header("authorization", "Bearer abc")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-request-id"], "r-1");
    let json: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(json["data"]["id"], 42);
}

#[tokio::test]
async fn test_forwards_method_and_body_and_relays_error_status() {
    let Some(upstream) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("PUT"))
        .and(path("/orders/9"))
        .and(body_string(r#"{"qty":3}"#))
        .respond_with(
            ResponseTemplate::new(409).set_body_json(json!({"code": 409, "message": "stale version"})),
        )
        .mount(&upstream)
        .await;

    let response = app(&upstream.uri())
        .oneshot(
            Request::put("/api/orders/9")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"qty":3}"#))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(json["message"], "stale version");
}

#[tokio::test]
async fn test_redirects_are_relayed_not_followed() {
    let Some(upstream) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
        .mount(&upstream)
        .await;

    let response = app(&upstream.uri())
        .oneshot(Request::get("/api/old").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()["location"], "/new");
}

#[tokio::test]
async fn test_demo_route_is_not_forwarded() {
    let Some(upstream) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&upstream)
        .await;

    let response = app(&upstream.uri())
        .oneshot(Request::get("/api/demo").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(json["message"], "Hello World");
}

#[tokio::test]
async fn test_unreachable_upstream_returns_502_envelope() {
    let Some(addr) = unused_local_addr() else {
        return;
    };
    let response = app(&format!("http://{addr}"))
        .oneshot(Request::get("/api/health-check").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let json: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(json["code"], 502);
    assert!(json["data"].is_null());
    assert!(json["message"].as_str().expect("message").contains("upstream request"));
}

#[tokio::test]
async fn test_served_proxy_sets_forwarded_for_from_peer() {
    let Some(upstream) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/whoami"))
        .and(header("x-forwarded-for", "127.0.0.1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&upstream)
        .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = ProxyState::new(ProxyConfig::new(&upstream.uri(), "/api").expect("config")).expect("state");
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(proxy::serve(listener, state, async {
        let _ = stop_rx.await;
    }));

    let body = reqwest::get(format!("http://{addr}/api/whoami"))
        .await
        .expect("proxy reachable")
        .text()
        .await
        .expect("body");
    assert_eq!(body, "ok");

    let _ = stop_tx.send(());
    server.await.expect("join").expect("clean shutdown");
}
