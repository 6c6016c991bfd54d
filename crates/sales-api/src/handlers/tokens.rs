//! Authentication token issue and revoke.

use super::{validate_email, validate_password, JsonBody, Validator};
use crate::crypto::{self, AUTHENTICATION_TOKEN_TTL_HOURS};
use crate::errors::ApiError;
use crate::models::{AuthenticatedPrincipal, Scope};
use crate::routes::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::Duration;
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, instrument};

#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    #[serde(default)]
    pub email: String,
    pub password: SecretString,
}

/// POST /v1/tokens/authentication
///
/// Exchanges email and password for a 24 hour authentication token.
#[instrument(skip_all, name = "sales.tokens.create")]
pub async fn create_authentication_token(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<CreateTokenRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let mut v = Validator::new();
    validate_email(&mut v, &payload.email);
    validate_password(&mut v, payload.password.expose_secret());
    v.finish()?;

    let record = state
        .users
        .find_by_email(&payload.email)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    if !record.principal.is_active {
        return Err(ApiError::validation(
            "email",
            "account must be activated to login",
        ));
    }

    if !crypto::verify_password(&payload.password, &record.password_hash)? {
        return Err(ApiError::InvalidCredentials);
    }

    let credential = crypto::generate_credential(
        record.principal.id,
        Duration::hours(AUTHENTICATION_TOKEN_TTL_HOURS),
        Scope::Authentication,
    )?;
    state.credentials.insert(&credential).await?;

    info!(user_id = %record.principal.id, "Authentication token issued");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "authentication_token": {
                "token": credential.plaintext.expose_secret(),
                "expiry": credential.expires_at,
            }
        })),
    ))
}

/// DELETE /v1/tokens/authentication
///
/// Revokes every authentication token of the caller.
#[instrument(skip_all, name = "sales.tokens.delete")]
pub async fn delete_authentication_tokens(
    State(state): State<Arc<AppState>>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
) -> Result<Json<Value>, ApiError> {
    state
        .credentials
        .delete_all_for_scope(principal.id, Scope::Authentication)
        .await?;

    info!(user_id = %principal.id, "Authentication tokens revoked");
    Ok(Json(json!({ "message": "authentication tokens deleted successfully" })))
}
