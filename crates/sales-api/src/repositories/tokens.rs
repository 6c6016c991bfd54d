//! Bearer credential queries. Only SHA-256 hashes are stored.

use crate::errors::ApiError;
use crate::models::{Credential, Principal, Scope};
use crate::repositories::users::User;
use chrono::{DateTime, Utc};
use common::types::PrincipalId;
use sqlx::PgPool;
use tracing::instrument;

/// Resolve the owner of a live credential.
///
/// Matches scope and hash and requires `expires_at` strictly after `now`.
#[instrument(skip_all, fields(scope = %scope))]
pub async fn find_principal_for_token(
    pool: &PgPool,
    scope: Scope,
    token_hash: &[u8],
    now: DateTime<Utc>,
) -> Result<Option<Principal>, ApiError> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT
            users.id, users.first_name, users.last_name, users.email,
            users.password_hash, users.role, users.is_active,
            users.created_at, users.updated_at, users.version
        FROM users
        INNER JOIN tokens ON users.id = tokens.user_id
        WHERE tokens.scope = $1
          AND tokens.hash = $2
          AND tokens.expires_at > $3
        "#,
    )
    .bind(scope.as_str())
    .bind(token_hash)
    .bind(now)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch user for token: {}", e)))?;

    Ok(user.map(|u| u.principal()))
}

#[instrument(skip_all, fields(scope = %credential.scope))]
pub async fn insert(pool: &PgPool, credential: &Credential) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        INSERT INTO tokens (hash, user_id, expires_at, scope)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&credential.hash)
    .bind(credential.principal_id.get())
    .bind(credential.expires_at)
    .bind(credential.scope.as_str())
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to insert token: {}", e)))?;

    Ok(())
}

#[instrument(skip_all, fields(scope = %scope))]
pub async fn delete_all_for_user(
    pool: &PgPool,
    principal_id: PrincipalId,
    scope: Scope,
) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        DELETE FROM tokens
        WHERE scope = $1 AND user_id = $2
        "#,
    )
    .bind(scope.as_str())
    .bind(principal_id.get())
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to delete tokens: {}", e)))?;

    Ok(())
}
