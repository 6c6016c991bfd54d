//! Integration tests for the product routes and their per-method guards

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use http_body_util::BodyExt;
use sales_api::stores::ProductStore;
use sales_test_utils::{TestPrincipalBuilder, TestWorld};
use serde_json::{json, Value};
use tower::ServiceExt;

fn request(method: Method, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token));
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
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
async fn test_product_crud_with_matching_permissions() {
    let world = TestWorld::new();
    let token = world
        .seed(
            TestPrincipalBuilder::new(1).with_role("admin").build(),
            &["product:view", "product:create", "product:delete"],
        )
        .await;
    let router = world.router();

    let created = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/products",
            &token,
            Some(json!({ "name": "  Espresso  ", "price": 2.5 })),
        ))
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    assert_eq!(
        created.headers().get(header::LOCATION).unwrap(),
        "/v1/products/1"
    );
    let body = body_json(created).await;
    assert_eq!(body["product"]["name"], "Espresso");
    assert_eq!(body["product"]["price"], 2.5);

    let shown = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products/1", &token, None))
        .await
        .unwrap();
    assert_eq!(shown.status(), StatusCode::OK);

    let listed = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products", &token, None))
        .await
        .unwrap();
    let body = body_json(listed).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 1);

    let deleted = router
        .clone()
        .oneshot(request(Method::DELETE, "/v1/products/1", &token, None))
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::OK);
    let body = body_json(deleted).await;
    assert_eq!(body["message"], "product successfully deleted");

    let missing = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products/1", &token, None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_each_method_checks_its_own_permission() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(2).build(), &["product:view"])
        .await;
    let router = world.router();

    let create = router
        .clone()
        .oneshot(request(
            Method::POST,
            "/v1/products",
            &token,
            Some(json!({ "name": "Latte", "price": 3.0 })),
        ))
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::FORBIDDEN);

    let delete = router
        .clone()
        .oneshot(request(Method::DELETE, "/v1/products/1", &token, None))
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);

    let view = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products", &token, None))
        .await
        .unwrap();
    assert_eq!(view.status(), StatusCode::OK);

    assert_eq!(world.products.calls(), 1);
}

#[tokio::test]
async fn test_invalid_product_is_rejected() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(3).build(), &["product:create"])
        .await;

    let response = world
        .router()
        .oneshot(request(
            Method::POST,
            "/v1/products",
            &token,
            Some(json!({ "name": "   ", "price": -1.0 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["name"], "must be provided");
    assert_eq!(body["error"]["price"], "must be a non-negative number");
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_update_product_bumps_version() {
    let world = TestWorld::new();
    let token = world
        .seed(
            TestPrincipalBuilder::new(4).with_role("admin").build(),
            &["product:view", "product:update"],
        )
        .await;
    world.products.insert("Mocha", 3.5).await.unwrap();
    let router = world.router();

    let updated = router
        .clone()
        .oneshot(request(
            Method::PUT,
            "/v1/products/1",
            &token,
            Some(json!({ "price": 4.0 })),
        ))
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let body = body_json(updated).await;
    assert_eq!(body["product"]["name"], "Mocha");
    assert_eq!(body["product"]["price"], 4.0);
    assert_eq!(body["product"]["version"], 2);

    let invalid = router
        .clone()
        .oneshot(request(
            Method::PUT,
            "/v1/products/1",
            &token,
            Some(json!({ "name": "" })),
        ))
        .await
        .unwrap();
    assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let missing = router
        .clone()
        .oneshot(request(
            Method::PUT,
            "/v1/products/99",
            &token,
            Some(json!({ "price": 1.0 })),
        ))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_product_requires_update_permission() {
    let world = TestWorld::new();
    let token = world
        .seed(
            TestPrincipalBuilder::new(5).build(),
            &["product:view", "product:create"],
        )
        .await;

    let response = world
        .router()
        .oneshot(request(
            Method::PUT,
            "/v1/products/1",
            &token,
            Some(json!({ "price": 1.0 })),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(world.products.calls(), 0);
}

#[tokio::test]
async fn test_list_products_filters_sorts_and_pages() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(6).build(), &["product:view"])
        .await;
    for (name, price) in [
        ("Espresso", 2.0),
        ("Flat White", 3.5),
        ("Iced Latte", 4.0),
        ("Latte", 3.0),
        ("Tea", 1.5),
    ] {
        world.products.insert(name, price).await.unwrap();
    }
    let router = world.router();

    let response = router
        .clone()
        .oneshot(request(
            Method::GET,
            "/v1/products?min_price=2&sort=-price&page=1&page_size=2",
            &token,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let names: Vec<&str> = body["products"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Iced Latte", "Flat White"]);
    assert_eq!(
        body["metadata"],
        json!({
            "current_page": 1,
            "page_size": 2,
            "first_page": 1,
            "last_page": 2,
            "total_records": 4
        })
    );

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products?name=latte", &token, None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["products"].as_array().unwrap().len(), 2);
    assert_eq!(body["metadata"]["total_records"], 2);

    let response = router
        .clone()
        .oneshot(request(Method::GET, "/v1/products?name=cocoa", &token, None))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert!(body["products"].as_array().unwrap().is_empty());
    assert_eq!(body["metadata"], json!({}));
}

#[tokio::test]
async fn test_list_products_rejects_bad_query_values() {
    let world = TestWorld::new();
    let token = world
        .seed(TestPrincipalBuilder::new(7).build(), &["product:view"])
        .await;

    let response = world
        .router()
        .oneshot(request(
            Method::GET,
            "/v1/products?page_size=500&sort=created_at&max_price=lots",
            &token,
            None,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["error"]["page_size"], "must be a maximum of 100");
    assert_eq!(body["error"]["sort"], "invalid sort value");
    assert_eq!(body["error"]["max_price"], "must be a number");
    assert_eq!(world.products.calls(), 0);
}
