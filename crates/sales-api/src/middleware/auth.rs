//! Bearer credential verification.
//!
//! Runs for every request. A missing `Authorization` header yields the
//! anonymous principal; a malformed header or token is rejected before the
//! credential store is consulted. The middleware never writes to the store.

use crate::crypto::{hash_token, is_well_formed_token};
use crate::errors::ApiError;
use crate::models::{RequestPrincipal, Scope};
use crate::observability::metrics::record_authentication;
use crate::stores::CredentialStore;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, instrument};

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub credentials: Arc<dyn CredentialStore>,
}

/// Attach a [`RequestPrincipal`] to the request or reject it with 401.
///
/// Every response, rejected or not, carries `Vary: Authorization`.
#[instrument(skip_all, name = "sales.middleware.auth")]
pub async fn authenticate(State(state): State<AuthState>, mut req: Request, next: Next) -> Response {
    let mut response = match resolve_principal(&state, req.headers()).await {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(e) => e.into_response(),
    };

    response
        .headers_mut()
        .append(header::VARY, HeaderValue::from_static("Authorization"));
    response
}

async fn resolve_principal(
    state: &AuthState,
    headers: &HeaderMap,
) -> Result<RequestPrincipal, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        record_authentication("anonymous");
        return Ok(RequestPrincipal::Anonymous);
    };

    let token = parse_bearer(value).inspect_err(|_| {
        debug!(target: "sales.middleware.auth", "Invalid Authorization header format");
        record_authentication("malformed");
    })?;

    if !is_well_formed_token(token) {
        debug!(target: "sales.middleware.auth", "Bearer token has wrong length");
        record_authentication("malformed");
        return Err(ApiError::InvalidAuthenticationToken);
    }

    let principal = state
        .credentials
        .find_active(Scope::Authentication, &hash_token(token), Utc::now())
        .await
        .inspect_err(|_| record_authentication("error"))?;

    match principal {
        Some(principal) => {
            record_authentication("authenticated");
            Ok(RequestPrincipal::Authenticated(principal))
        }
        None => {
            record_authentication("unknown");
            Err(ApiError::InvalidAuthenticationToken)
        }
    }
}

/// Split `Bearer <token>` on single spaces. Exactly two parts are accepted
/// and the scheme match is case sensitive.
pub fn parse_bearer(value: &HeaderValue) -> Result<&str, ApiError> {
    let value = value
        .to_str()
        .map_err(|_| ApiError::InvalidAuthenticationToken)?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Ok(token),
        _ => Err(ApiError::InvalidAuthenticationToken),
    }
}
