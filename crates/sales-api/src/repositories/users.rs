//! User repository module for database operations.

use crate::errors::ApiError;
use crate::models::{Page, PageRequest, Principal};
use crate::stores::{NewUser, UserFilter, UserRecord};
use chrono::{DateTime, Utc};
use common::types::PrincipalId;
use sqlx::PgPool;

/// Unique constraint on `users.email`.
const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";

/// User model (maps to users table)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i32,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal {
            id: PrincipalId(self.id),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            is_active: self.is_active,
        }
    }
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        UserRecord {
            principal: user.principal(),
            password_hash: user.password_hash,
            version: user.version,
        }
    }
}

/// A listed row with the size of the whole filtered set.
#[derive(Debug, sqlx::FromRow)]
struct CountedUser {
    total_records: i64,
    #[sqlx(flatten)]
    user: User,
}

/// Map a write failure, turning the email constraint into a field error.
fn write_error(e: sqlx::Error, action: &str) -> ApiError {
    let duplicate = e
        .as_database_error()
        .and_then(|db| db.constraint())
        .is_some_and(|c| c == EMAIL_UNIQUE_CONSTRAINT);
    if duplicate {
        ApiError::validation("email", "a user with this email address already exists")
    } else {
        ApiError::Database(format!("Failed to {} user: {}", action, e))
    }
}

/// Insert a new, inactive user.
pub async fn create_user(pool: &PgPool, user: &NewUser) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (first_name, last_name, email, password_hash, role, is_active)
        VALUES ($1, $2, $3, $4, $5, FALSE)
        RETURNING
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        "#,
    )
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.role)
    .fetch_one(pool)
    .await
    .map_err(|e| write_error(e, "create"))?;

    Ok(user)
}

/// Get user by email.
pub async fn get_by_email(pool: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch user by email: {}", e)))?;

    Ok(user)
}

/// Get user by id.
pub async fn get_by_id(pool: &PgPool, id: PrincipalId) -> Result<Option<User>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch user by id: {}", e)))?;

    Ok(user)
}

/// One page of users matching `filter`, `id` breaking sort ties.
///
/// The sort column comes from `USER_SORT_COLUMNS` via [`PageRequest`].
pub async fn get_all(
    pool: &PgPool,
    filter: &UserFilter,
    page: &PageRequest,
) -> Result<Page<User>, ApiError> {
    let query = format!(
        r#"
        SELECT COUNT(*) OVER() AS total_records,
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        FROM users
        WHERE ($1::TEXT IS NULL OR (first_name || ' ' || last_name) ILIKE '%' || $1 || '%')
          AND ($2::TEXT IS NULL OR email ILIKE '%' || $2 || '%')
          AND ($3::TEXT IS NULL OR role = $3)
          AND ($4::BOOLEAN IS NULL OR is_active = $4)
        ORDER BY {} {}, id ASC
        LIMIT $5 OFFSET $6
        "#,
        page.sort.column,
        page.sort.direction()
    );

    let rows = sqlx::query_as::<_, CountedUser>(&query)
        .bind(filter.name.as_deref())
        .bind(filter.email.as_deref())
        .bind(filter.role.as_deref())
        .bind(filter.is_active)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to list users: {}", e)))?;

    let total_records = rows.first().map_or(0, |row| row.total_records);
    Ok(Page {
        items: rows.into_iter().map(|row| row.user).collect(),
        total_records,
    })
}

/// Write every mutable column if `version` still matches, bumping it.
///
/// A stale version or a deleted row surfaces as `EditConflict`.
pub async fn update(pool: &PgPool, record: &UserRecord) -> Result<User, ApiError> {
    let principal = &record.principal;
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET first_name = $1, last_name = $2, email = $3, password_hash = $4,
            role = $5, is_active = $6, updated_at = NOW(), version = version + 1
        WHERE id = $7 AND version = $8
        RETURNING
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        "#,
    )
    .bind(&principal.first_name)
    .bind(&principal.last_name)
    .bind(&principal.email)
    .bind(&record.password_hash)
    .bind(&principal.role)
    .bind(principal.is_active)
    .bind(principal.id.get())
    .bind(record.version)
    .fetch_optional(pool)
    .await
    .map_err(|e| write_error(e, "update"))?;

    user.ok_or(ApiError::EditConflict)
}

/// Returns whether a row was deleted. Tokens and grants cascade.
pub async fn delete(pool: &PgPool, id: PrincipalId) -> Result<bool, ApiError> {
    let result = sqlx::query(
        r#"
        DELETE FROM users
        WHERE id = $1
        "#,
    )
    .bind(id.get())
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to delete user: {}", e)))?;

    Ok(result.rows_affected() > 0)
}

/// Set `is_active` and bump the row version.
///
/// A missing row surfaces as `EditConflict`: the user was deleted or changed
/// between the token lookup and this update.
pub async fn activate(pool: &PgPool, id: PrincipalId) -> Result<User, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET is_active = TRUE, updated_at = NOW(), version = version + 1
        WHERE id = $1
        RETURNING
            id, first_name, last_name, email, password_hash, role,
            is_active, created_at, updated_at, version
        "#,
    )
    .bind(id.get())
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to activate user: {}", e)))?;

    user.ok_or(ApiError::EditConflict)
}
