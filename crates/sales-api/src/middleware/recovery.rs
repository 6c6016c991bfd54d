//! Outermost stage of the pipeline.
//!
//! `CatchPanicLayer` turns a panic anywhere beneath it into a generic 500
//! that asks the client to close the connection. [`report_server_faults`]
//! sits above it and logs every response carrying a [`ServerFault`] marker,
//! whether it came from a handler error or a recovered panic.

use crate::errors::{ApiError, ServerFault};
use axum::{
    extract::Request,
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::any::Any;
use tracing::error;

/// Log server faults with the request method and path.
pub async fn report_server_faults(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    if let Some(ServerFault(cause)) = response.extensions().get::<ServerFault>() {
        error!(
            target: "sales.middleware.recovery",
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            error = %cause,
            "Server fault"
        );
    }

    response
}

/// Response for a recovered panic. Used with `CatchPanicLayer::custom`.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    };

    let mut response = ApiError::Internal(format!("panic recovered: {detail}")).into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
