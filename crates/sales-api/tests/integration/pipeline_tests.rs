//! Integration tests for the CORS, authentication and authorization stages
//! and the request timeout
//!
//! Requests run through the full router built by `build_routes` against the
//! in-memory stores, so call counters show exactly which stages reached a
//! store.

use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::response::Response;
use chrono::Duration;
use common::types::PrincipalId;
use http_body_util::BodyExt;
use sales_api::models::Scope;
use sales_api::routes::REQUEST_TIMEOUT;
use sales_test_utils::{test_config, TestPrincipalBuilder, TestWorld};
use tower::ServiceExt;

const VALID_LENGTH_TOKEN: &str = "Vt3lqGSdVXLyFf0P4l5sZg";

fn get(uri: &str, authorization: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(Body::empty()).expect("request should build")
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body should be JSON")
}

fn preflight(uri: &str, origin: &str) -> Request<Body> {
    Request::builder()
        .method(Method::OPTIONS)
        .uri(uri)
        .header(header::ORIGIN, origin)
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "authorization")
        .header(header::AUTHORIZATION, "Bearer not-a-real-token")
        .body(Body::empty())
        .expect("request should build")
}

// ============================================================================
// CORS
// ============================================================================

#[tokio::test]
async fn test_preflight_answered_before_limiter_and_authentication() {
    // A zero burst rejects every request that reaches the limiter
    let world = TestWorld::with_config(test_config(&[
        ("CORS_TRUSTED_ORIGINS", "http://app.example"),
        ("LIMITER_ENABLED", "true"),
        ("LIMITER_BURST", "0"),
    ]));
    let router = world.router();

    let response = router
        .clone()
        .oneshot(preflight("/v1/products/1", "http://app.example"))
        .await
        .unwrap();

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://app.example"
    );
    let allowed = response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_METHODS)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(allowed.contains("DELETE"));
    assert_eq!(world.credentials.find_calls(), 0);

    // The same client without a preflight is stopped by the limiter
    let limited = router
        .clone()
        .oneshot(get("/health", Some("Bearer not-a-real-token")))
        .await
        .unwrap();
    assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(world.credentials.find_calls(), 0);
}

#[tokio::test]
async fn test_untrusted_origin_gets_no_cors_headers() {
    let world = TestWorld::with_config(test_config(&[(
        "CORS_TRUSTED_ORIGINS",
        "http://app.example http://admin.example",
    )]));
    let router = world.router();

    let mut request = get("/health", None);
    request
        .headers_mut()
        .insert(header::ORIGIN, HeaderValue::from_static("http://evil.example"));
    let response = router.clone().oneshot(request).await.unwrap();

    // The request is still served; the browser withholds it from the page
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());

    let response = router
        .clone()
        .oneshot(preflight("/v1/products/1", "http://evil.example"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
    assert_eq!(world.credentials.find_calls(), 0);
}

#[tokio::test]
async fn test_trusted_origin_on_simple_request_is_echoed() {
    let world = TestWorld::with_config(test_config(&[(
        "CORS_TRUSTED_ORIGINS",
        "http://app.example http://admin.example",
    )]));

    let mut request = get("/health", None);
    request
        .headers_mut()
        .insert(header::ORIGIN, HeaderValue::from_static("http://admin.example"));
    let response = world.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://admin.example"
    );
    let vary: Vec<_> = response
        .headers()
        .get_all(header::VARY)
        .iter()
        .map(|v| v.to_str().unwrap().to_ascii_lowercase())
        .collect();
    assert!(vary.iter().any(|v| v.contains("origin")));
    assert!(vary.iter().any(|v| v.contains("authorization")));
}

#[tokio::test]
async fn test_wildcard_origin_is_ignored_not_fatal() {
    let world = TestWorld::with_config(test_config(&[(
        "CORS_TRUSTED_ORIGINS",
        "* http://app.example",
    )]));

    let router = world.router();

    let response = router
        .clone()
        .oneshot(preflight("/v1/products/1", "http://app.example"))
        .await
        .unwrap();
    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://app.example"
    );

    let response = router
        .clone()
        .oneshot(preflight("/v1/products/1", "http://other.example"))
        .await
        .unwrap();
    assert!(response
        .headers()
        .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn test_wildcard_only_origin_list_still_serves() {
    let world = TestWorld::with_config(test_config(&[("CORS_TRUSTED_ORIGINS", "*")]));

    let response = world.router().oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_anonymous_request_to_guarded_route_is_unauthorized() {
    let world = TestWorld::new();

    let response = world
        .router()
        .oneshot(get("/v1/products", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::VARY).unwrap(),
        "Authorization"
    );
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "you must be authenticated to access this resource"
    );
    assert_eq!(world.products.calls(), 0);
    assert_eq!(world.permissions.lookups(), 0);
}

#[tokio::test]
async fn test_anonymous_request_to_public_route_succeeds() {
    let world = TestWorld::new();

    let response = world.router().oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::VARY).unwrap(),
        "Authorization"
    );
    let body = body_json(response).await;
    assert_eq!(body["status"], "available");
    assert_eq!(body["system_info"]["environment"], "test");
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let world = TestWorld::new();
    let principal = TestPrincipalBuilder::new(1).build();
    world.seed(principal, &["product:view"]).await;

    let expired = world
        .issue_token(PrincipalId(1), Scope::Authentication, Duration::seconds(-5))
        .await;
    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", expired))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers().get(header::WWW_AUTHENTICATE).unwrap(),
        "Bearer"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid or missing authentication token");
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_token_expiring_now_is_rejected() {
    let world = TestWorld::new();
    world
        .seed(TestPrincipalBuilder::new(1).build(), &["product:view"])
        .await;

    let token = world.issue_token_expiring_now(PrincipalId(1)).await;
    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_activation_token_does_not_authenticate() {
    let world = TestWorld::new();
    world
        .seed(TestPrincipalBuilder::new(1).build(), &["product:view"])
        .await;

    let activation = world
        .issue_token(PrincipalId(1), Scope::Activation, Duration::hours(1))
        .await;
    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", activation))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_token_is_rejected_after_one_lookup() {
    let world = TestWorld::new();

    let response = world
        .router()
        .oneshot(get(
            "/health",
            Some(&format!("Bearer {}", VALID_LENGTH_TOKEN)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(world.credentials.find_calls(), 1);
}

#[tokio::test]
async fn test_malformed_headers_never_reach_the_store() {
    let world = TestWorld::new();
    let router = world.router();

    let cases = [
        "Bearer".to_string(),
        "bearer Vt3lqGSdVXLyFf0P4l5sZg".to_string(),
        "Basic dXNlcjpwYXNz".to_string(),
        "Bearer  Vt3lqGSdVXLyFf0P4l5sZg".to_string(),
        "Bearer Vt3lqGSdVXLyFf0P4l5sZg extra".to_string(),
        "Bearer short".to_string(),
        format!("Bearer {}x", VALID_LENGTH_TOKEN),
        String::new(),
    ];

    for value in &cases {
        let response = router
            .clone()
            .oneshot(get("/health", Some(value)))
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNAUTHORIZED,
            "header {:?} should be rejected",
            value
        );
    }

    let mut request = get("/health", None);
    request.headers_mut().insert(
        header::AUTHORIZATION,
        HeaderValue::from_bytes(b"Bearer \xffVt3lqGSdVXLyFf0P4l5s").unwrap(),
    );
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(world.credentials.find_calls(), 0);
}

#[tokio::test]
async fn test_credential_store_failure_is_a_server_error() {
    let world = TestWorld::new();
    world.credentials.set_failing(true);

    let response = world
        .router()
        .oneshot(get(
            "/health",
            Some(&format!("Bearer {}", VALID_LENGTH_TOKEN)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "the server encountered a problem and could not process your request"
    );
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_inactive_principal_is_forbidden() {
    let world = TestWorld::new();
    let token = world
        .seed(
            TestPrincipalBuilder::new(2).inactive().build(),
            &["product:view"],
        )
        .await;

    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "your user account must be activated to access this resource"
    );
    assert_eq!(world.permissions.lookups(), 0);
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_inactive_principal_can_still_read_profile() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(2).inactive().build(), &[])
        .await;

    let response = world
        .router()
        .oneshot(get("/v1/users/profile", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"]["email"], "user2@example.com");
    assert_eq!(body["user"]["is_active"], false);
}

#[tokio::test]
async fn test_missing_permission_is_forbidden() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(3).build(), &["self:view"])
        .await;

    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "you do not have the necessary permissions to access this resource"
    );
    assert_eq!(world.permissions.lookups(), 1);
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_permitted_request_runs_handler_once() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(4).build(), &["product:view"])
        .await;

    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["products"].as_array().unwrap().is_empty());
    assert_eq!(world.products.calls(), 1);
    assert_eq!(world.credentials.find_calls(), 1);
    assert_eq!(world.permissions.lookups(), 1);
}

#[tokio::test]
async fn test_permission_changes_apply_on_next_request() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(5).build(), &["self:view"])
        .await;
    let router = world.router();
    let auth = format!("Bearer {}", token);

    let before = router
        .clone()
        .oneshot(get("/v1/users", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::FORBIDDEN);

    world.grant(PrincipalId(5), &["users:view"]).await;
    let granted = router
        .clone()
        .oneshot(get("/v1/users", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(granted.status(), StatusCode::OK);

    world.permissions.revoke(PrincipalId(5), "users:view").await;
    let revoked = router
        .clone()
        .oneshot(get("/v1/users", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(revoked.status(), StatusCode::FORBIDDEN);

    assert_eq!(world.permissions.lookups(), 3);
}

#[tokio::test]
async fn test_permission_store_failure_is_a_server_error() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(6).build(), &["product:view"])
        .await;
    world.permissions.set_failing(true);

    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_deactivation_applies_on_next_request() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(7).build(), &["product:view"])
        .await;
    let router = world.router();
    let auth = format!("Bearer {}", token);

    let active = router
        .clone()
        .oneshot(get("/v1/products", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(active.status(), StatusCode::OK);

    world.users.set_active(PrincipalId(7), false).await;
    let inactive = router
        .clone()
        .oneshot(get("/v1/products", Some(&auth)))
        .await
        .unwrap();
    assert_eq!(inactive.status(), StatusCode::FORBIDDEN);
}

// ============================================================================
// Request timeout
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_hung_credential_lookup_is_bounded_by_request_timeout() {
    let world = TestWorld::new();
    world
        .credentials
        .set_lookup_delay(REQUEST_TIMEOUT * 6);

    let response = world
        .router()
        .oneshot(get(
            "/health",
            Some(&format!("Bearer {}", VALID_LENGTH_TOKEN)),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(world.credentials.find_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_lookup_within_timeout_succeeds() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(8).build(), &["product:view"])
        .await;
    world
        .credentials
        .set_lookup_delay(REQUEST_TIMEOUT / 2);

    let response = world
        .router()
        .oneshot(get("/v1/products", Some(&format!("Bearer {}", token))))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
