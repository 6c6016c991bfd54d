use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;
use thiserror::Error;

/// Message returned for every server fault. Internals stay in the logs.
pub const SERVER_ERROR_MESSAGE: &str =
    "the server encountered a problem and could not process your request";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Failed validation: {0:?}")]
    FailedValidation(BTreeMap<String, String>),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Invalid or missing authentication token")]
    InvalidAuthenticationToken,

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Account inactive")]
    InactiveAccount,

    #[error("Not permitted")]
    NotPermitted,

    #[error("Resource not found")]
    NotFound,

    #[error("Edit conflict")]
    EditConflict,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Marker attached to 5xx responses so the recovery stage can log the
/// underlying cause together with the request method and path.
#[derive(Debug, Clone)]
pub struct ServerFault(pub String);

impl ApiError {
    /// Single-field validation failure.
    pub fn validation(field: &str, message: &str) -> Self {
        ApiError::FailedValidation(BTreeMap::from([(field.to_string(), message.to_string())]))
    }

    /// Server faults are logged; client faults never are.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal(_)
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::FailedValidation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidCredentials
            | ApiError::InvalidAuthenticationToken
            | ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::InactiveAccount | ApiError::NotPermitted => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::EditConflict => StatusCode::CONFLICT,
            ApiError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let message = match &self {
            ApiError::BadRequest(reason) => json!(reason),
            ApiError::FailedValidation(fields) => json!(fields),
            ApiError::InvalidCredentials => json!("invalid authentication credentials"),
            ApiError::InvalidAuthenticationToken => {
                json!("invalid or missing authentication token")
            }
            ApiError::AuthenticationRequired => {
                json!("you must be authenticated to access this resource")
            }
            ApiError::InactiveAccount => {
                json!("your user account must be activated to access this resource")
            }
            ApiError::NotPermitted => {
                json!("you do not have the necessary permissions to access this resource")
            }
            ApiError::NotFound => json!("the requested resource could not be found"),
            ApiError::EditConflict => json!(
                "unable to update the record due to an edit conflict, please try again"
            ),
            ApiError::RateLimitExceeded => json!("rate limit exceeded"),
            ApiError::Database(_) | ApiError::Crypto(_) | ApiError::Internal(_) => {
                json!(SERVER_ERROR_MESSAGE)
            }
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();

        if matches!(self, ApiError::InvalidAuthenticationToken) {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }

        if self.is_server_fault() {
            response
                .extensions_mut()
                .insert(ServerFault(self.to_string()));
        }

        response
    }
}
