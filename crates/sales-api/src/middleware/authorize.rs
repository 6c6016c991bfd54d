//! Per-route authorization guards.
//!
//! Guards read the [`RequestPrincipal`] attached by the authentication
//! middleware. The checks compose in a fixed order: authenticated, then
//! active, then permission. Permission sets are loaded from the store on
//! every request.

use crate::errors::ApiError;
use crate::models::RequestPrincipal;
use crate::observability::metrics::record_authorization_denied;
use crate::stores::PermissionStore;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use common::types::PrincipalId;
use std::sync::Arc;
use tracing::debug;

/// State for [`require_permission`]: the store to consult and the code the
/// route requires.
#[derive(Clone)]
pub struct PermissionGuard {
    pub permissions: Arc<dyn PermissionStore>,
    pub code: &'static str,
}

impl PermissionGuard {
    pub fn new(permissions: Arc<dyn PermissionStore>, code: &'static str) -> Self {
        Self { permissions, code }
    }
}

/// Reject anonymous requests with 401.
pub async fn require_authenticated(req: Request, next: Next) -> Result<Response, ApiError> {
    request_principal(&req)?
        .authenticated()
        .inspect_err(|_| record_authorization_denied("unauthenticated"))?;
    Ok(next.run(req).await)
}

/// Reject anonymous requests with 401 and inactive accounts with 403.
pub async fn require_active(req: Request, next: Next) -> Result<Response, ApiError> {
    ensure_active(&req)?;
    Ok(next.run(req).await)
}

/// Reject unless the active principal holds `guard.code`.
pub async fn require_permission(
    State(guard): State<PermissionGuard>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal_id = ensure_active(&req)?;

    let permissions = guard.permissions.permissions_for(principal_id).await?;
    if !permissions.includes(guard.code) {
        debug!(
            target: "sales.middleware.authorize",
            permission = guard.code,
            "Permission denied"
        );
        record_authorization_denied("permission");
        return Err(ApiError::NotPermitted);
    }

    Ok(next.run(req).await)
}

fn request_principal(req: &Request) -> Result<&RequestPrincipal, ApiError> {
    req.extensions().get::<RequestPrincipal>().ok_or_else(|| {
        ApiError::Internal("authorization guard ran without authentication".to_string())
    })
}

fn ensure_active(req: &Request) -> Result<PrincipalId, ApiError> {
    match request_principal(req)?.active() {
        Ok(principal) => Ok(principal.id),
        Err(e) => {
            let reason = match &e {
                ApiError::InactiveAccount => "inactive",
                _ => "unauthenticated",
            };
            record_authorization_denied(reason);
            Err(e)
        }
    }
}
