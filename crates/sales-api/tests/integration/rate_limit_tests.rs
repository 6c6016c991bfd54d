//! Integration tests for per-client rate limiting
//!
//! These run against a real server so that the client identity comes from
//! the peer address.

use reqwest::StatusCode;
use sales_test_utils::{test_config, TestApiServer, TestWorld};

#[tokio::test]
async fn test_burst_is_admitted_then_rejected() -> Result<(), anyhow::Error> {
    let config = test_config(&[
        ("LIMITER_ENABLED", "true"),
        ("LIMITER_RPS", "0.001"),
        ("LIMITER_BURST", "3"),
    ]);
    let server = TestApiServer::spawn(TestWorld::with_config(config)).await?;
    let client = reqwest::Client::new();

    for attempt in 1..=3 {
        let response = client
            .get(format!("{}/health", server.url()))
            .send()
            .await?;
        assert_eq!(
            response.status(),
            StatusCode::OK,
            "request {} should be within the burst",
            attempt
        );
    }

    let rejected = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = rejected.json().await?;
    assert_eq!(body["error"], "rate limit exceeded");

    assert_eq!(server.world().limiter.tracked_clients(), 1);

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_rejection_happens_before_authentication() -> Result<(), anyhow::Error> {
    let config = test_config(&[
        ("LIMITER_ENABLED", "true"),
        ("LIMITER_RPS", "0.001"),
        ("LIMITER_BURST", "1"),
    ]);
    let server = TestApiServer::spawn(TestWorld::with_config(config)).await?;
    let client = reqwest::Client::new();

    let first = client
        .get(format!("{}/health", server.url()))
        .send()
        .await?;
    assert_eq!(first.status(), StatusCode::OK);

    let second = client
        .get(format!("{}/health", server.url()))
        .bearer_auth("Vt3lqGSdVXLyFf0P4l5sZg")
        .send()
        .await?;
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(server.world().credentials.find_calls(), 0);

    server.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn test_disabled_limiter_admits_everything() -> Result<(), anyhow::Error> {
    let config = test_config(&[("LIMITER_ENABLED", "false"), ("LIMITER_BURST", "1")]);
    let server = TestApiServer::spawn(TestWorld::with_config(config)).await?;
    let client = reqwest::Client::new();

    for _ in 0..20 {
        let response = client
            .get(format!("{}/health", server.url()))
            .send()
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
    }
    assert_eq!(server.world().limiter.tracked_clients(), 0);

    server.shutdown().await?;
    Ok(())
}
