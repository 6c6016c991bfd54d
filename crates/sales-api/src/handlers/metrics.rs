//! Metrics endpoints.
//!
//! Both are unauthenticated and expose only counters with bounded labels.

use crate::routes::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{json, Value};
use std::sync::Arc;

/// Handler for GET /v1/metrics
///
/// JSON snapshot of the in-process request counters plus the number of
/// outstanding background tasks.
pub async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().timestamp(),
        "background_tasks": state.background.outstanding(),
        "requests": state.metrics.snapshot(),
    }))
}

/// Handler for GET /metrics
///
/// Returns Prometheus-formatted metrics for scraping.
#[tracing::instrument(skip_all, name = "sales.metrics.scrape")]
pub async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}
