// tests/integration/proxy_test.rs

//! End-to-end proxy pipeline tests: caching semantics, admission, header
//! hygiene, and origin failure handling.

use super::fixtures::EdgeHarness;
use axum::http::Method;
use opaledge::core::cache::key::derive_key;

const TEST_HOST: &str = "test.example.com";

#[tokio::test]
async fn test_cache_miss_then_hit() {
    let edge = EdgeHarness::new().await;

    let first = edge.get("/hello", TEST_HOST).await;
    assert_eq!(first.status(), 200);
    assert_eq!(
        first.headers().get("x-cache-status").unwrap(),
        "MISS",
        "first request must be a miss"
    );
    assert_eq!(first.text().await.unwrap(), "Hello, World!");

    let second = edge.get("/hello", TEST_HOST).await;
    assert_eq!(second.status(), 200);
    assert_eq!(second.headers().get("x-cache-status").unwrap(), "HIT");
    let cache_date = second
        .headers()
        .get("x-cache-date")
        .expect("hits carry X-Cache-Date")
        .to_str()
        .unwrap()
        .to_string();
    assert!(
        chrono::DateTime::parse_from_rfc3339(&cache_date).is_ok(),
        "X-Cache-Date '{cache_date}' must be RFC 3339"
    );
    assert_eq!(second.text().await.unwrap(), "Hello, World!");

    // The origin served the content exactly once.
    assert_eq!(edge.origin.hits("GET /hello"), 1);
}

#[tokio::test]
async fn test_no_cache_directive_is_never_stored() {
    let edge = EdgeHarness::new().await;

    for _ in 0..2 {
        let response = edge.get("/no-cache", TEST_HOST).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-cache-status").unwrap(), "MISS");
        assert_eq!(response.text().await.unwrap(), "Not cacheable");
    }
    assert_eq!(edge.origin.hits("GET /no-cache"), 2);

    let key = derive_key(
        &Method::GET,
        TEST_HOST,
        "/no-cache",
        None,
        &axum::http::HeaderMap::new(),
    );
    assert!(edge.state.cache.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_set_cookie_is_never_stored() {
    let edge = EdgeHarness::new().await;

    let first = edge.get("/cookie", TEST_HOST).await;
    assert_eq!(first.status(), 200);
    // The cookie still reaches the client on the relayed response.
    assert!(first.headers().get("set-cookie").is_some());

    let second = edge.get("/cookie", TEST_HOST).await;
    assert_eq!(second.headers().get("x-cache-status").unwrap(), "MISS");
    assert_eq!(edge.origin.hits("GET /cookie"), 2);
}

#[tokio::test]
async fn test_post_is_proxied_but_never_cached() {
    let edge = EdgeHarness::new().await;

    for _ in 0..2 {
        let response = edge
            .client
            .post(edge.url("/hello"))
            .header(reqwest::header::HOST, TEST_HOST)
            .json(&serde_json::json!({ "name": "opal" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.headers().get("x-cache-status").unwrap(), "MISS");
        let body: serde_json::Value = response.json().await.unwrap();
        assert!(body["received"].as_str().unwrap().contains("opal"));
    }
    assert_eq!(edge.origin.hits("POST /hello"), 2);
}

#[tokio::test]
async fn test_origin_error_is_relayed_and_not_cached() {
    let edge = EdgeHarness::new().await;

    for _ in 0..2 {
        let response = edge.get("/error", TEST_HOST).await;
        assert_eq!(response.status(), 500);
        assert_eq!(response.headers().get("x-cache-status").unwrap(), "MISS");
        assert_eq!(response.text().await.unwrap(), "Internal Server Error");
    }
    assert_eq!(edge.origin.hits("GET /error"), 2);
}

#[tokio::test]
async fn test_unknown_host_is_not_configured() {
    let edge = EdgeHarness::new().await;

    let response = edge.get("/hello", "unknown.domain.com").await;
    assert_eq!(response.status(), 404);
    let body = response.text().await.unwrap();
    assert!(
        body.contains("Domain not configured"),
        "unexpected body: {body}"
    );
}

#[tokio::test]
async fn test_inactive_domain_is_unavailable() {
    let edge = EdgeHarness::new().await;

    let response = edge.get("/hello", "inactive.example.com").await;
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn test_hop_by_hop_headers_do_not_cross_the_upstream_hop() {
    let edge = EdgeHarness::new().await;

    let response = edge
        .client
        .get(edge.url("/echo-headers"))
        .header(reqwest::header::HOST, TEST_HOST)
        .header("x-custom", "carried")
        .header("proxy-authorization", "Basic abc")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let seen: serde_json::Value = response.json().await.unwrap();
    let seen = seen.as_object().unwrap();

    for name in [
        "connection",
        "keep-alive",
        "proxy-authenticate",
        "proxy-authorization",
        "te",
        "trailers",
        "transfer-encoding",
        "upgrade",
    ] {
        assert!(!seen.contains_key(name), "'{name}' leaked to origin");
    }

    // End-to-end headers survive, and the forwarding headers are applied.
    assert_eq!(seen["x-custom"][0], "carried");
    assert_eq!(seen["x-forwarded-for"][0], "127.0.0.1");
    assert_eq!(seen["x-forwarded-proto"][0], "http");
    // Host is re-set to the origin, not the inbound domain.
    assert_ne!(seen["host"][0], TEST_HOST);
}

#[tokio::test]
async fn test_declared_oversized_body_is_bad_gateway() {
    let edge = EdgeHarness::with_config(|config| config.max_body_bytes = 1024).await;

    let response = edge.get("/huge", TEST_HOST).await;
    assert_eq!(response.status(), 502);

    // Nothing was cached for the key.
    let key = derive_key(
        &Method::GET,
        TEST_HOST,
        "/huge",
        None,
        &axum::http::HeaderMap::new(),
    );
    assert!(edge.state.cache.get(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn test_oversized_chunked_body_is_bad_gateway() {
    let edge = EdgeHarness::with_config(|config| config.max_body_bytes = 1024).await;

    let response = edge.get("/huge-stream", TEST_HOST).await;
    assert_eq!(response.status(), 502);
}

#[tokio::test]
async fn test_rate_limit_refusal_carries_retry_hint() {
    let edge = EdgeHarness::with_config(|config| {
        config.rate_limit_rps = 1;
        config.rate_limit_burst = 2;
    })
    .await;

    let first = edge.get("/hello", TEST_HOST).await;
    assert_eq!(first.status(), 200);
    let second = edge.get("/hello", TEST_HOST).await;
    assert_eq!(second.status(), 200);

    let third = edge.get("/hello", TEST_HOST).await;
    assert_eq!(third.status(), 429);
    assert_eq!(third.headers().get("retry-after").unwrap(), "60");
    let body: serde_json::Value = third.json().await.unwrap();
    assert_eq!(body["retry_after"], "60s");
}

#[tokio::test]
async fn test_health_endpoint_reports_cache_size() {
    let edge = EdgeHarness::new().await;

    // Warm the cache so the size is non-zero.
    edge.get("/hello", TEST_HOST).await;

    let response = edge.client.get(edge.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert!(body["cache_size"].as_u64().unwrap() > 0);
    assert!(
        chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok()
    );
}
