//! Integration tests for request accounting and the metrics endpoints

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use sales_test_utils::TestWorld;
use serde_json::Value;
use tower::ServiceExt;

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request should build")
}

async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

#[tokio::test]
async fn test_snapshot_counts_responses_by_class() {
    let world = TestWorld::new();
    let router = world.router();

    for uri in ["/health", "/health", "/v1/products", "/does-not-exist"] {
        router.clone().oneshot(get(uri)).await.unwrap();
    }

    let response = router.clone().oneshot(get("/v1/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;

    let requests = &body["requests"];
    // The snapshot request itself is received but not yet answered
    assert_eq!(requests["total_requests_received"], 5);
    assert_eq!(requests["total_responses_sent"], 4);
    assert_eq!(requests["total_responses_by_status"]["2xx"], 2);
    assert_eq!(requests["total_responses_by_status"]["4xx"], 2);
    assert_eq!(requests["total_responses_by_status"]["5xx"], 0);
    assert_eq!(requests["total_cancelled_requests"], 0);
    assert_eq!(body["background_tasks"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_rejected_requests_are_counted() {
    let world = TestWorld::new();
    let request = Request::builder()
        .uri("/health")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::empty())
        .unwrap();

    let response = world.router().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let snapshot = world.metrics.snapshot();
    assert_eq!(snapshot.total_requests_received, 1);
    assert_eq!(snapshot.total_responses_sent, 1);
    assert_eq!(snapshot.total_responses_by_status.get("4xx"), Some(&1));
}

#[tokio::test]
async fn test_prometheus_endpoint_is_public() {
    let world = TestWorld::new();

    let response = world.router().oneshot(get("/metrics")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
