use crate::errors::ApiError;
use crate::observability::metrics::record_rate_limit_decision;
use crate::services::ClientLimiter;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

/// Identity used when the peer address is not available.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Admit the request or reject it with 429. Rejections are final.
pub async fn rate_limit(
    State(limiter): State<Arc<ClientLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !limiter.is_enabled() {
        return Ok(next.run(request).await);
    }

    let identity = client_identity(&request);
    if !limiter.allow(&identity) {
        debug!(target: "sales.middleware.rate_limit", "Rate limit exceeded");
        record_rate_limit_decision("rejected");
        return Err(ApiError::RateLimitExceeded);
    }

    record_rate_limit_decision("allowed");
    Ok(next.run(request).await)
}

/// Peer IP from `ConnectInfo`, without the port.
pub fn client_identity(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}
