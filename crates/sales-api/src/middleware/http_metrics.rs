//! Request accounting.
//!
//! Bookkeeping is done by a guard that runs on drop, so a request is
//! accounted exactly once even when its future never completes: a client
//! disconnect counts as cancelled and an unwinding panic counts as a 5xx.

use crate::observability::metrics::{record_http_cancelled, record_http_request};
use crate::observability::RequestMetrics;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

struct InFlight {
    metrics: Arc<RequestMetrics>,
    method: String,
    path: String,
    start: Instant,
    status: Option<StatusCode>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let status = match self.status {
            Some(status) => status,
            None if std::thread::panicking() => StatusCode::INTERNAL_SERVER_ERROR,
            None => {
                self.metrics.request_cancelled(elapsed);
                record_http_cancelled();
                return;
            }
        };

        self.metrics.response_sent(status, elapsed);
        record_http_request(&self.method, &self.path, status.as_u16(), elapsed);
    }
}

/// Middleware that records every request passing below CORS.
pub async fn http_metrics_middleware(
    State(metrics): State<Arc<RequestMetrics>>,
    request: Request,
    next: Next,
) -> Response {
    metrics.request_received();
    let mut in_flight = InFlight {
        metrics,
        method: request.method().to_string(),
        path: request.uri().path().to_string(),
        start: Instant::now(),
        status: None,
    };

    let response = next.run(request).await;
    in_flight.status = Some(response.status());
    response
}
