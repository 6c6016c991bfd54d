//! Store traits consumed by the request pipeline and the handlers.
//!
//! Every trait is object safe and shared as `Arc<dyn _>` through
//! [`crate::routes::AppState`]. [`postgres`] holds the sqlx-backed
//! implementations; [`mock`] holds in-memory doubles with call counters.

pub mod mock;
pub mod postgres;

use crate::errors::ApiError;
use crate::models::{Credential, Page, PageRequest, Permissions, Principal, Scope};
use chrono::{DateTime, Utc};
use common::types::PrincipalId;
use serde::Serialize;

/// Bearer credential persistence. Only hashes cross this boundary.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Principal owning a credential with this scope and hash that expires
    /// strictly after `now`.
    async fn find_active(
        &self,
        scope: Scope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ApiError>;

    async fn insert(&self, credential: &Credential) -> Result<(), ApiError>;

    /// Remove every credential of `scope` owned by `principal_id`.
    async fn delete_all_for_scope(
        &self,
        principal_id: PrincipalId,
        scope: Scope,
    ) -> Result<(), ApiError>;
}

/// Permission grants. Reads are never cached by callers.
#[async_trait::async_trait]
pub trait PermissionStore: Send + Sync {
    async fn permissions_for(&self, principal_id: PrincipalId) -> Result<Permissions, ApiError>;

    /// Grant `codes` to `principal_id`. Unknown codes are ignored.
    async fn grant(&self, principal_id: PrincipalId, codes: &[&str]) -> Result<(), ApiError>;

    /// Revoke every grant of `principal_id`, ahead of a role change.
    async fn clear(&self, principal_id: PrincipalId) -> Result<(), ApiError>;
}

/// Fields of a registration after validation and password hashing.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
}

/// A principal together with its stored password hash and row version.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub principal: Principal,
    pub password_hash: String,
    pub version: i32,
}

/// Columns `GET /v1/users` may sort on.
pub const USER_SORT_COLUMNS: &[&str] = &["id", "first_name", "last_name", "email"];

/// Optional filters for listing users. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Case-insensitive substring of "first last".
    pub name: Option<String>,
    /// Case-insensitive substring of the email.
    pub email: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

impl UserFilter {
    pub fn matches(&self, principal: &Principal) -> bool {
        let full_name = format!("{} {}", principal.first_name, principal.last_name);
        self.name
            .as_deref()
            .map_or(true, |n| contains_ignore_case(&full_name, n))
            && self
                .email
                .as_deref()
                .map_or(true, |e| contains_ignore_case(&principal.email, e))
            && self.role.as_deref().map_or(true, |r| principal.role == r)
            && self.is_active.map_or(true, |a| principal.is_active == a)
    }
}

#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Insert an inactive user. A duplicate email is a validation failure.
    async fn insert(&self, user: NewUser) -> Result<Principal, ApiError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError>;

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, ApiError>;

    async fn find_record_by_id(&self, id: PrincipalId) -> Result<Option<UserRecord>, ApiError>;

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<Principal>, ApiError>;

    /// Mark the user active and return the updated principal.
    async fn activate(&self, id: PrincipalId) -> Result<Principal, ApiError>;

    /// Write every field of `record` if the stored version still equals
    /// `record.version`. Returns the record with its new version.
    ///
    /// A stale version or a missing row is an `EditConflict`; a duplicate
    /// email is a validation failure.
    async fn update(&self, record: &UserRecord) -> Result<UserRecord, ApiError>;

    /// Returns `false` when no user had this id. Credentials and grants go
    /// with the user.
    async fn delete(&self, id: PrincipalId) -> Result<bool, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

/// Columns `GET /v1/products` may sort on.
pub const PRODUCT_SORT_COLUMNS: &[&str] = &["id", "name", "price"];

/// Optional filters for listing products. `None` matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductFilter {
    /// Case-insensitive substring of the name.
    pub name: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.name
            .as_deref()
            .map_or(true, |n| contains_ignore_case(&product.name, n))
            && self.min_price.map_or(true, |min| product.price >= min)
            && self.max_price.map_or(true, |max| product.price <= max)
    }
}

#[async_trait::async_trait]
pub trait ProductStore: Send + Sync {
    async fn insert(&self, name: &str, price: f64) -> Result<Product, ApiError>;

    async fn get(&self, id: i64) -> Result<Option<Product>, ApiError>;

    async fn list(
        &self,
        filter: &ProductFilter,
        page: &PageRequest,
    ) -> Result<Page<Product>, ApiError>;

    /// Write name and price if the stored version still equals
    /// `product.version`. A stale version or a missing row is an
    /// `EditConflict`.
    async fn update(&self, product: &Product) -> Result<Product, ApiError>;

    /// Returns `false` when no product had this id.
    async fn delete(&self, id: i64) -> Result<bool, ApiError>;
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
