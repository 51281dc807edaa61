//! Database operations for the `product_fetch_status` table.
//!
//! The per-product enablement flag is owned by an operator surface outside
//! this system; the scheduler only ever reads it, and the writer exists for
//! seeding and tests.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::DbError;

/// A row from the `product_fetch_status` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductFetchStatusRow {
    pub product_id: i64,
    pub is_fetching_enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// Returns the ids of all products with fetching enabled, in id order.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_fetch_enabled_products(pool: &PgPool) -> Result<Vec<i64>, DbError> {
    let ids = sqlx::query_scalar::<_, i64>(
        "SELECT product_id FROM product_fetch_status \
         WHERE is_fetching_enabled = TRUE \
         ORDER BY product_id",
    )
    .fetch_all(pool)
    .await?;

    Ok(ids)
}

/// Inserts or updates the enablement flag for a product.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn set_fetching_enabled(
    pool: &PgPool,
    product_id: i64,
    enabled: bool,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO product_fetch_status (product_id, is_fetching_enabled) \
         VALUES ($1, $2) \
         ON CONFLICT (product_id) DO UPDATE SET \
             is_fetching_enabled = EXCLUDED.is_fetching_enabled, \
             updated_at = NOW()",
    )
    .bind(product_id)
    .bind(enabled)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches the enablement row for a single product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the product has no row, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_product_fetch_status(
    pool: &PgPool,
    product_id: i64,
) -> Result<ProductFetchStatusRow, DbError> {
    let row = sqlx::query_as::<_, ProductFetchStatusRow>(
        "SELECT product_id, is_fetching_enabled, updated_at \
         FROM product_fetch_status \
         WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
