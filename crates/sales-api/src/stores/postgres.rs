//! Store implementations backed by a shared `sqlx::PgPool`.

use super::{
    CredentialStore, NewUser, PermissionStore, Product, ProductFilter, ProductStore, UserFilter,
    UserRecord, UserStore,
};
use crate::errors::ApiError;
use crate::models::{Credential, Page, PageRequest, Permissions, Principal, Scope};
use crate::repositories::{permissions, products, tokens, users};
use chrono::{DateTime, Utc};
use common::types::PrincipalId;
use sqlx::PgPool;

#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_active(
        &self,
        scope: Scope,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Principal>, ApiError> {
        tokens::find_principal_for_token(&self.pool, scope, token_hash, now).await
    }

    async fn insert(&self, credential: &Credential) -> Result<(), ApiError> {
        tokens::insert(&self.pool, credential).await
    }

    async fn delete_all_for_scope(
        &self,
        principal_id: PrincipalId,
        scope: Scope,
    ) -> Result<(), ApiError> {
        tokens::delete_all_for_user(&self.pool, principal_id, scope).await
    }
}

#[derive(Debug, Clone)]
pub struct PgPermissionStore {
    pool: PgPool,
}

impl PgPermissionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl PermissionStore for PgPermissionStore {
    async fn permissions_for(&self, principal_id: PrincipalId) -> Result<Permissions, ApiError> {
        permissions::get_all_for_user(&self.pool, principal_id).await
    }

    async fn grant(&self, principal_id: PrincipalId, codes: &[&str]) -> Result<(), ApiError> {
        permissions::assign(&self.pool, principal_id, codes).await
    }

    async fn clear(&self, principal_id: PrincipalId) -> Result<(), ApiError> {
        permissions::clear(&self.pool, principal_id).await
    }
}

#[derive(Debug, Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, user: NewUser) -> Result<Principal, ApiError> {
        Ok(users::create_user(&self.pool, &user).await?.principal())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, ApiError> {
        Ok(users::get_by_email(&self.pool, email).await?.map(Into::into))
    }

    async fn find_by_id(&self, id: PrincipalId) -> Result<Option<Principal>, ApiError> {
        Ok(users::get_by_id(&self.pool, id)
            .await?
            .map(|u| u.principal()))
    }

    async fn find_record_by_id(&self, id: PrincipalId) -> Result<Option<UserRecord>, ApiError> {
        Ok(users::get_by_id(&self.pool, id).await?.map(Into::into))
    }

    async fn list(
        &self,
        filter: &UserFilter,
        page: &PageRequest,
    ) -> Result<Page<Principal>, ApiError> {
        let page = users::get_all(&self.pool, filter, page).await?;
        Ok(Page {
            items: page.items.iter().map(users::User::principal).collect(),
            total_records: page.total_records,
        })
    }

    async fn activate(&self, id: PrincipalId) -> Result<Principal, ApiError> {
        Ok(users::activate(&self.pool, id).await?.principal())
    }

    async fn update(&self, record: &UserRecord) -> Result<UserRecord, ApiError> {
        Ok(users::update(&self.pool, record).await?.into())
    }

    async fn delete(&self, id: PrincipalId) -> Result<bool, ApiError> {
        users::delete(&self.pool, id).await
    }
}

#[derive(Debug, Clone)]
pub struct PgProductStore {
    pool: PgPool,
}

impl PgProductStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ProductStore for PgProductStore {
    async fn insert(&self, name: &str, price: f64) -> Result<Product, ApiError> {
        products::create(&self.pool, name, price).await
    }

    async fn get(&self, id: i64) -> Result<Option<Product>, ApiError> {
        products::get_by_id(&self.pool, id).await
    }

    async fn list(
        &self,
        filter: &ProductFilter,
        page: &PageRequest,
    ) -> Result<Page<Product>, ApiError> {
        products::get_all(&self.pool, filter, page).await
    }

    async fn update(&self, product: &Product) -> Result<Product, ApiError> {
        products::update(&self.pool, product).await
    }

    async fn delete(&self, id: i64) -> Result<bool, ApiError> {
        products::delete(&self.pool, id).await
    }
}
