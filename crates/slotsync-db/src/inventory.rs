//! Database operations for inventory snapshots: `slots`, `prices`,
//! `pax_categories`, and `pax_availability`.
//!
//! Slot snapshots are append-only. Every sync inserts fresh `slots` rows for
//! the fetched dates instead of updating earlier ones; read projections
//! prefer the newest rows, and older snapshots are inert history.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use slotsync_core::SlotPayload;
use sqlx::PgPool;

use crate::DbError;

/// One row of the slot/pax/price join used by the slots read projection.
///
/// The pax-side columns are `NULL` for a slot with no pax availability.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SlotPaxRow {
    pub slot_id: i64,
    pub start_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub slot_remaining: i32,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub category_description: Option<String>,
    pub pax_max: Option<i32>,
    pub pax_min: Option<i32>,
    pub pax_remaining: Option<i32>,
    pub is_primary: Option<bool>,
    pub final_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub price_currency: Option<String>,
}

/// One row of the available-dates projection: a date and its representative
/// price (primary pax of the newest snapshot for that date).
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DatePriceRow {
    pub start_date: NaiveDate,
    pub final_price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    pub discount: Option<Decimal>,
    pub price_currency: Option<String>,
}

/// Persists one fetched slot descriptor as a new slot row plus its pax
/// availability graph, in a single transaction.
///
/// Per pax entry: a fresh price row is inserted, the shared pax category is
/// upserted by id, and a linking pax-availability row ties the three
/// together. Returns the new slot id.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if any insert fails; the transaction is rolled
/// back and no rows from this slot remain.
pub async fn insert_slot_graph(
    pool: &PgPool,
    product_id: i64,
    slot: &SlotPayload,
) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;

    let slot_id: i64 = sqlx::query_scalar(
        "INSERT INTO slots \
             (provider_slot_id, product_id, start_date, start_time, end_time, \
              remaining, variant_id, currency_code) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
         RETURNING id",
    )
    .bind(slot.provider_slot_id)
    .bind(product_id)
    .bind(slot.start_date)
    .bind(&slot.start_time)
    .bind(&slot.end_time)
    .bind(slot.remaining)
    .bind(slot.variant_id)
    .bind(&slot.currency_code)
    .fetch_one(&mut *tx)
    .await?;

    for pax in &slot.pax_availability {
        let price_id: i64 = sqlx::query_scalar(
            "INSERT INTO prices (final_price, original_price, discount, currency_code) \
             VALUES ($1, $2, COALESCE($3, 0), $4) \
             RETURNING id",
        )
        .bind(pax.price.final_price)
        .bind(pax.price.original_price)
        .bind(pax.price.discount)
        .bind(&pax.price.currency_code)
        .fetch_one(&mut *tx)
        .await?;

        upsert_pax_category(
            &mut *tx,
            &pax.category,
            pax.name.as_deref(),
            pax.description.as_deref(),
        )
        .await?;

        sqlx::query(
            "INSERT INTO pax_availability \
                 (slot_id, pax_category_id, price_id, max, min, remaining, is_primary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(slot_id)
        .bind(&pax.category)
        .bind(price_id)
        .bind(pax.max)
        .bind(pax.min)
        .bind(pax.remaining)
        .bind(pax.is_primary.unwrap_or(false))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(slot_id)
}

/// Inserts or overwrites a pax category by its provider code.
///
/// A `NULL` name falls back to the code itself so the dictionary row is
/// always displayable.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn upsert_pax_category<'e, E>(
    executor: E,
    id: &str,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<(), DbError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO pax_categories (id, name, description) \
         VALUES ($1, COALESCE($2, $1), $3) \
         ON CONFLICT (id) DO UPDATE SET \
             name        = COALESCE(EXCLUDED.name, pax_categories.name), \
             description = EXCLUDED.description",
    )
    .bind(id)
    .bind(name)
    .bind(description)
    .execute(executor)
    .await?;

    Ok(())
}

/// Returns all stored slots for a product and date, joined with their pax
/// availability, category, and price rows.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_slots_with_pax(
    pool: &PgPool,
    product_id: i64,
    date: NaiveDate,
) -> Result<Vec<SlotPaxRow>, DbError> {
    let rows = sqlx::query_as::<_, SlotPaxRow>(
        "SELECT s.id AS slot_id, s.start_date, s.start_time, s.end_time, \
                s.remaining AS slot_remaining, \
                pc.id AS category_id, pc.name AS category_name, \
                pc.description AS category_description, \
                pa.max AS pax_max, pa.min AS pax_min, \
                pa.remaining AS pax_remaining, pa.is_primary, \
                p.final_price, p.original_price, p.discount, \
                p.currency_code AS price_currency \
         FROM slots s \
         LEFT JOIN pax_availability pa ON pa.slot_id = s.id \
         LEFT JOIN pax_categories pc ON pc.id = pa.pax_category_id \
         LEFT JOIN prices p ON p.id = pa.price_id \
         WHERE s.product_id = $1 AND s.start_date = $2 \
         ORDER BY s.id, pa.id",
    )
    .bind(product_id)
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Returns one row per distinct date in `[from, to]` that has stored slots
/// for the product, each with the representative price of the newest
/// snapshot (primary pax preferred), ordered by date.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_available_dates(
    pool: &PgPool,
    product_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<DatePriceRow>, DbError> {
    let rows = sqlx::query_as::<_, DatePriceRow>(
        "SELECT DISTINCT ON (s.start_date) \
                s.start_date, \
                p.final_price, p.original_price, p.discount, \
                p.currency_code AS price_currency \
         FROM slots s \
         LEFT JOIN pax_availability pa ON pa.slot_id = s.id \
         LEFT JOIN prices p ON p.id = pa.price_id \
         WHERE s.product_id = $1 AND s.start_date >= $2 AND s.start_date <= $3 \
         ORDER BY s.start_date, s.id DESC, pa.is_primary DESC NULLS LAST, pa.id",
    )
    .bind(product_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
