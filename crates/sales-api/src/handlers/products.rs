use super::{parse_id, read_f64, read_page, read_string, JsonBody, QueryParams, Validator};
use crate::errors::ApiError;
use crate::models::PageMetadata;
use crate::routes::AppState;
use crate::stores::{ProductFilter, PRODUCT_SORT_COLUMNS};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: f64,
}

/// Absent fields keep their stored value.
#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
}

fn validate_product(v: &mut Validator, name: &str, price: f64) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 200, "name", "must not be more than 200 bytes long");
    v.check(
        price.is_finite() && price >= 0.0,
        "price",
        "must be a non-negative number",
    );
}

/// GET /v1/products
///
/// Query: `name`, `min_price`, `max_price`, `page`, `page_size`, `sort`.
pub async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueryParams>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let filter = ProductFilter {
        name: read_string(&query, "name"),
        min_price: read_f64(&mut v, &query, "min_price"),
        max_price: read_f64(&mut v, &query, "max_price"),
    };
    let page = read_page(&mut v, &query, PRODUCT_SORT_COLUMNS);
    v.finish()?;

    let products = state.products.list(&filter, &page).await?;
    let metadata = PageMetadata::calculate(products.total_records, &page);
    Ok(Json(json!({ "products": products.items, "metadata": metadata })))
}

/// POST /v1/products
pub async fn create_product(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CreateProductRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Value>), ApiError> {
    let name = payload.name.trim();

    let mut v = Validator::new();
    validate_product(&mut v, name, payload.price);
    v.finish()?;

    let product = state.products.insert(name, payload.price).await?;

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/products/{}", product.id)) {
        headers.insert(header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(json!({ "product": product })),
    ))
}

/// GET /v1/products/:id
pub async fn show_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let product = state.products.get(id).await?.ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "product": product })))
}

/// PUT /v1/products/:id
///
/// The write is conditional on the version read here, so a concurrent
/// update in between yields 409.
pub async fn update_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateProductRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let mut product = state.products.get(id).await?.ok_or(ApiError::NotFound)?;

    if let Some(name) = payload.name {
        product.name = name.trim().to_string();
    }
    if let Some(price) = payload.price {
        product.price = price;
    }

    let mut v = Validator::new();
    validate_product(&mut v, &product.name, product.price);
    v.finish()?;

    let product = state.products.update(&product).await?;
    Ok(Json(json!({ "product": product })))
}

/// DELETE /v1/products/:id
pub async fn delete_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    if !state.products.delete(id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "message": "product successfully deleted" })))
}
