use crate::errors::ApiError;
use crate::models::{Page, PageRequest};
use crate::stores::{Product, ProductFilter};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i32,
}

/// A listed row with the size of the whole filtered set.
#[derive(Debug, sqlx::FromRow)]
struct CountedProductRow {
    total_records: i64,
    #[sqlx(flatten)]
    product: ProductRow,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price: row.price,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        }
    }
}

pub async fn create(pool: &PgPool, name: &str, price: f64) -> Result<Product, ApiError> {
    let row = sqlx::query_as::<_, ProductRow>(
        r#"
        INSERT INTO products (name, price)
        VALUES ($1, $2)
        RETURNING id, name, price, created_at, updated_at, version
        "#,
    )
    .bind(name)
    .bind(price)
    .fetch_one(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to create product: {}", e)))?;

    Ok(row.into())
}

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Option<Product>, ApiError> {
    let row = sqlx::query_as::<_, ProductRow>(
        r#"
        SELECT id, name, price, created_at, updated_at, version
        FROM products
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to fetch product: {}", e)))?;

    Ok(row.map(Into::into))
}

/// One page of products matching `filter`.
///
/// The sort column comes from `PRODUCT_SORT_COLUMNS` via [`PageRequest`];
/// `id` breaks ties so pages are stable.
pub async fn get_all(
    pool: &PgPool,
    filter: &ProductFilter,
    page: &PageRequest,
) -> Result<Page<Product>, ApiError> {
    let query = format!(
        r#"
        SELECT COUNT(*) OVER() AS total_records,
            id, name, price, created_at, updated_at, version
        FROM products
        WHERE ($1::TEXT IS NULL OR name ILIKE '%' || $1 || '%')
          AND ($2::DOUBLE PRECISION IS NULL OR price >= $2)
          AND ($3::DOUBLE PRECISION IS NULL OR price <= $3)
        ORDER BY {} {}, id ASC
        LIMIT $4 OFFSET $5
        "#,
        page.sort.column,
        page.sort.direction()
    );

    let rows = sqlx::query_as::<_, CountedProductRow>(&query)
        .bind(filter.name.as_deref())
        .bind(filter.min_price)
        .bind(filter.max_price)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(pool)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to list products: {}", e)))?;

    let total_records = rows.first().map_or(0, |row| row.total_records);
    Ok(Page {
        items: rows.into_iter().map(|row| row.product.into()).collect(),
        total_records,
    })
}

/// Write name and price and bump the version, if the version still matches.
pub async fn update(pool: &PgPool, product: &Product) -> Result<Product, ApiError> {
    let row = sqlx::query_as::<_, ProductRow>(
        r#"
        UPDATE products
        SET name = $1, price = $2, updated_at = NOW(), version = version + 1
        WHERE id = $3 AND version = $4
        RETURNING id, name, price, created_at, updated_at, version
        "#,
    )
    .bind(&product.name)
    .bind(product.price)
    .bind(product.id)
    .bind(product.version)
    .fetch_optional(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to update product: {}", e)))?;

    row.map(Into::into).ok_or(ApiError::EditConflict)
}

/// Returns whether a row was deleted.
pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, ApiError> {
    let result = sqlx::query(
        r#"
        DELETE FROM products
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| ApiError::Database(format!("Failed to delete product: {}", e)))?;

    Ok(result.rows_affected() > 0)
}
