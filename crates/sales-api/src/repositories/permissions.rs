//! Permission grant queries.

use crate::errors::ApiError;
use crate::models::Permissions;
use common::types::PrincipalId;
use sqlx::PgPool;
use tracing::instrument;

/// Every permission code granted to the user.
#[instrument(skip_all)]
pub async fn get_all_for_user(
    pool: &PgPool,
    principal_id: PrincipalId,
) -> Result<Permissions, ApiError> {
    let codes: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT p.code
        FROM permissions p
        INNER JOIN users_permissions up ON up.permission_id = p.id
        INNER JOIN users u ON up.user_id = u.id
        WHERE up.user_id = $1
        "#,
    )
    .bind(principal_id.get())
    .fetch_all(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch permissions: {}", e)))?;

    Ok(codes.into_iter().map(|(code,)| code).collect())
}

/// Grant codes to a user. Codes absent from the permissions table are skipped.
#[instrument(skip_all)]
pub async fn assign(
    pool: &PgPool,
    principal_id: PrincipalId,
    codes: &[&str],
) -> Result<(), ApiError> {
    let mut codes: Vec<String> = codes.iter().map(|c| c.to_string()).collect();
    codes.sort();
    codes.dedup();

    sqlx::query(
        r#"
        INSERT INTO users_permissions (user_id, permission_id)
        SELECT $1, p.id
        FROM permissions p
        WHERE p.code = ANY($2)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(principal_id.get())
    .bind(&codes)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to assign permissions: {}", e)))?;

    Ok(())
}

#[instrument(skip_all)]
pub async fn clear(pool: &PgPool, principal_id: PrincipalId) -> Result<(), ApiError> {
    sqlx::query(
        r#"
        DELETE FROM users_permissions
        WHERE user_id = $1
        "#,
    )
    .bind(principal_id.get())
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to clear permissions: {}", e)))?;

    Ok(())
}
