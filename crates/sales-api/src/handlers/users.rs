//! Registration, activation, user lookup and account changes.

use super::{
    parse_id, read_bool, read_page, read_string, validate_email, validate_password, JsonBody,
    QueryParams, Validator,
};
use crate::crypto::{self, is_well_formed_token, ACTIVATION_TOKEN_TTL_HOURS};
use crate::errors::ApiError;
use crate::models::{AuthenticatedPrincipal, PageMetadata, Principal, Role, Scope};
use crate::routes::AppState;
use crate::stores::{NewUser, UserFilter, USER_SORT_COLUMNS};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use common::secret::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, instrument};

#[derive(Debug, Deserialize)]
pub struct RegisterUserRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    pub password: SecretString,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct ActivateUserRequest {
    pub token: SecretString,
}

/// Administrative change to any account. Absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateUserRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

/// Change to the caller's own account. Role and activation are not
/// self-service.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<SecretString>,
}

impl From<UpdateProfileRequest> for UpdateUserRequest {
    fn from(profile: UpdateProfileRequest) -> Self {
        UpdateUserRequest {
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            password: profile.password,
            ..UpdateUserRequest::default()
        }
    }
}

fn validate_names(v: &mut Validator, first_name: &str, last_name: &str) {
    v.check(!first_name.is_empty(), "first_name", "must be provided");
    v.check(
        first_name.len() <= 100,
        "first_name",
        "must not be more than 100 characters long",
    );
    v.check(!last_name.is_empty(), "last_name", "must be provided");
    v.check(
        last_name.len() <= 100,
        "last_name",
        "must not be more than 100 characters long",
    );
}

/// POST /v1/users
///
/// Creates an inactive user, grants the role's permissions, issues an
/// activation token and hands it to the notifier in the background.
#[instrument(skip_all, name = "sales.users.register")]
pub async fn register_user(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<RegisterUserRequest>,
) -> Result<(StatusCode, HeaderMap, Json<Value>), ApiError> {
    let mut v = Validator::new();
    validate_names(&mut v, &payload.first_name, &payload.last_name);
    validate_email(&mut v, &payload.email);
    validate_password(&mut v, payload.password.expose_secret());
    let role = payload.role.parse::<Role>();
    v.check(role.is_ok(), "role", "must be one of the permitted values");
    v.finish()?;
    let role = role?;

    let password_hash = crypto::hash_password(&payload.password, state.config.bcrypt_cost)?;

    let principal = state
        .users
        .insert(NewUser {
            first_name: payload.first_name,
            last_name: payload.last_name,
            email: payload.email,
            password_hash,
            role: role.as_str().to_string(),
        })
        .await?;

    if let Err(e) = state
        .permissions
        .grant(principal.id, role.default_permissions())
        .await
    {
        error!(user_id = %principal.id, error = %e, "Failed to assign role permissions");
    }

    let credential = crypto::generate_credential(
        principal.id,
        Duration::hours(ACTIVATION_TOKEN_TTL_HOURS),
        Scope::Activation,
    )?;
    state.credentials.insert(&credential).await?;

    let notifier = Arc::clone(&state.notifier);
    let recipient = principal.clone();
    let token = credential.plaintext;
    state.background.run("activation_notice", async move {
        notifier.send_activation(&recipient, &token).await
    });

    info!(user_id = %principal.id, role = role.as_str(), "User registered");

    let mut headers = HeaderMap::new();
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/users/{}", principal.id)) {
        headers.insert(header::LOCATION, location);
    }

    Ok((
        StatusCode::CREATED,
        headers,
        Json(json!({ "user": principal })),
    ))
}

/// PUT /v1/users/activate
#[instrument(skip_all, name = "sales.users.activate")]
pub async fn activate_user(
    State(state): State<Arc<AppState>>,
    JsonBody(payload): JsonBody<ActivateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = payload.token.expose_secret();

    let mut v = Validator::new();
    v.check(!token.is_empty(), "token", "must be provided");
    v.check(is_well_formed_token(token), "token", "must be 22 bytes long");
    v.finish()?;

    let principal = state
        .credentials
        .find_active(Scope::Activation, &crypto::hash_token(token), Utc::now())
        .await?
        .ok_or_else(|| ApiError::validation("token", "invalid or expired activation token"))?;

    let activated = state.users.activate(principal.id).await?;
    state
        .credentials
        .delete_all_for_scope(activated.id, Scope::Activation)
        .await?;

    info!(user_id = %activated.id, "User activated");
    Ok(Json(json!({ "message": "account successfully activated" })))
}

/// GET /v1/users/profile
pub async fn show_profile(AuthenticatedPrincipal(principal): AuthenticatedPrincipal) -> Json<Value> {
    Json(json!({ "user": principal }))
}

/// PUT /v1/users/profile/:id
///
/// `id` must be the caller's own; anything else is a permission failure.
#[instrument(skip_all, name = "sales.users.update_profile")]
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    AuthenticatedPrincipal(caller): AuthenticatedPrincipal,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    if caller.id.get() != id {
        return Err(ApiError::NotPermitted);
    }

    let user = apply_user_update(&state, id, payload.into()).await?;
    Ok(Json(json!({ "user": user })))
}

/// GET /v1/users
///
/// Query: `name`, `email`, `role`, `is_active`, `page`, `page_size`, `sort`.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<QueryParams>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let filter = UserFilter {
        name: read_string(&query, "name"),
        email: read_string(&query, "email"),
        role: read_string(&query, "role"),
        is_active: read_bool(&mut v, &query, "is_active"),
    };
    let page = read_page(&mut v, &query, USER_SORT_COLUMNS);
    v.finish()?;

    let users = state.users.list(&filter, &page).await?;
    let metadata = PageMetadata::calculate(users.total_records, &page);
    Ok(Json(json!({ "users": users.items, "metadata": metadata })))
}

/// GET /v1/users/:id
pub async fn show_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let user = state
        .users
        .find_by_id(id.into())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(json!({ "user": user })))
}

/// PUT /v1/users/:id
#[instrument(skip_all, name = "sales.users.update")]
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    JsonBody(payload): JsonBody<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let user = apply_user_update(&state, id, payload).await?;
    Ok(Json(json!({ "user": user })))
}

/// DELETE /v1/users/:id
#[instrument(skip_all, name = "sales.users.delete")]
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    if !state.users.delete(id.into()).await? {
        return Err(ApiError::NotFound);
    }

    info!(user_id = id, "User deleted");
    Ok(Json(json!({ "message": "user successfully deleted" })))
}

/// Merge `changes` into the stored user and write it back under the version
/// that was read. A role change replaces the grants with the new role's
/// defaults.
async fn apply_user_update(
    state: &AppState,
    id: i64,
    changes: UpdateUserRequest,
) -> Result<Principal, ApiError> {
    let mut record = state
        .users
        .find_record_by_id(id.into())
        .await?
        .ok_or(ApiError::NotFound)?;
    let previous_role = record.principal.role.clone();
    let user = &mut record.principal;

    if let Some(first_name) = changes.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = changes.last_name {
        user.last_name = last_name;
    }
    if let Some(email) = changes.email {
        user.email = email;
    }
    if let Some(role) = changes.role {
        user.role = role;
    }
    if let Some(is_active) = changes.is_active {
        user.is_active = is_active;
    }

    let mut v = Validator::new();
    validate_names(&mut v, &user.first_name, &user.last_name);
    validate_email(&mut v, &user.email);
    if let Some(password) = &changes.password {
        validate_password(&mut v, password.expose_secret());
    }
    let role = user.role.parse::<Role>();
    v.check(role.is_ok(), "role", "must be one of the permitted values");
    v.finish()?;
    let role = role?;

    if let Some(password) = &changes.password {
        record.password_hash = crypto::hash_password(password, state.config.bcrypt_cost)?;
    }

    let saved = state.users.update(&record).await?;
    let principal = saved.principal;

    if role.as_str() != previous_role {
        state.permissions.clear(principal.id).await?;
        state
            .permissions
            .grant(principal.id, role.default_permissions())
            .await?;
        info!(user_id = %principal.id, role = role.as_str(), "User role changed");
    }

    info!(user_id = %principal.id, version = saved.version, "User updated");
    Ok(principal)
}
