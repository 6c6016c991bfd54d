//! HTTP handlers and the request-body helpers they share.

pub mod health;
pub mod metrics;
pub mod products;
pub mod tokens;
pub mod users;

pub use health::health_check;
pub use metrics::{metrics_handler, metrics_snapshot};

use crate::errors::ApiError;
use crate::models::paging::{DEFAULT_PAGE_SIZE, MAX_PAGE, MAX_PAGE_SIZE};
use crate::models::{PageRequest, Sort};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

/// Raw query-string pairs of a list request.
pub type QueryParams = HashMap<String, String>;

/// `Json` extractor whose rejection is an [`ApiError::BadRequest`] in the
/// standard error envelope.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ApiError::BadRequest(rejection.body_text())),
        }
    }
}

/// Collects field errors. The first message recorded for a field wins.
#[derive(Debug, Default)]
pub struct Validator {
    errors: BTreeMap<String, String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.errors
                .entry(field.to_string())
                .or_insert_with(|| message.to_string());
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// `Ok(())` when no check failed, otherwise a `FailedValidation` error.
    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::FailedValidation(self.errors))
        }
    }
}

/// Shape check for an email address: one `@`, a non-empty local part and a
/// dotted domain.
pub fn looks_like_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(email.len() <= 254, "email", "must not be more than 254 characters long");
    v.check(looks_like_email(email), "email", "must be a valid email address");
}

pub fn validate_password(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 characters long");
    v.check(password.len() <= 72, "password", "must not be more than 72 characters long");
    v.check(
        password.chars().any(|c| c.is_ascii_digit()),
        "password",
        "must contain at least one number",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_uppercase()),
        "password",
        "must contain at least one uppercase letter",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_lowercase()),
        "password",
        "must contain at least one lowercase letter",
    );
    v.check(
        password.chars().any(|c| c.is_ascii_punctuation()),
        "password",
        "must contain at least one special character",
    );
}

/// Parse a positive numeric path id. Anything else is a 404.
pub fn parse_id(raw: &str) -> Result<i64, ApiError> {
    match raw.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(ApiError::NotFound),
    }
}

/// A trimmed, non-empty query value.
pub fn read_string(query: &QueryParams, key: &str) -> Option<String> {
    query
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// A parsed query value. A value that does not parse records `message`
/// against `key` and reads as absent.
fn read_parsed<T: FromStr>(
    v: &mut Validator,
    query: &QueryParams,
    key: &str,
    message: &str,
) -> Option<T> {
    let raw = read_string(query, key)?;
    let parsed = raw.parse::<T>().ok();
    v.check(parsed.is_some(), key, message);
    parsed
}

pub fn read_f64(v: &mut Validator, query: &QueryParams, key: &str) -> Option<f64> {
    let value = read_parsed::<f64>(v, query, key, "must be a number")?;
    v.check(value.is_finite(), key, "must be a number");
    Some(value)
}

pub fn read_bool(v: &mut Validator, query: &QueryParams, key: &str) -> Option<bool> {
    read_parsed(v, query, key, "must be true or false")
}

/// `page`, `page_size` and `sort` of a list request, validated.
///
/// `sort` is a column from `columns`, `-` prefixed for descending; the
/// first column is the default.
pub fn read_page(
    v: &mut Validator,
    query: &QueryParams,
    columns: &'static [&'static str],
) -> PageRequest {
    let default_column = columns.first().copied().unwrap_or("id");

    let page = read_parsed::<i64>(v, query, "page", "must be an integer value").unwrap_or(1);
    v.check(page > 0, "page", "must be greater than zero");
    v.check(page <= MAX_PAGE, "page", "must be a maximum of 500");

    let page_size = read_parsed::<i64>(v, query, "page_size", "must be an integer value")
        .unwrap_or(DEFAULT_PAGE_SIZE);
    v.check(page_size > 0, "page_size", "must be greater than zero");
    v.check(page_size <= MAX_PAGE_SIZE, "page_size", "must be a maximum of 100");

    let sort = match read_string(query, "sort") {
        Some(raw) => {
            let sort = Sort::parse(&raw, columns);
            v.check(sort.is_some(), "sort", "invalid sort value");
            sort
        }
        None => None,
    };

    PageRequest {
        page,
        page_size,
        sort: sort.unwrap_or_else(|| Sort::ascending(default_column)),
    }
}
