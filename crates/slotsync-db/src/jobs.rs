//! Database operations for the `fetch_jobs` table.
//!
//! Jobs are append-only: a row is inserted as pending and its `status` column
//! walks forward through in-progress to a terminal state. Every transition is
//! guarded by a `WHERE status = <expected>` clause, so a regressing or
//! double-terminal write surfaces as [`DbError::InvalidJobTransition`]
//! instead of silently clobbering history.

use chrono::{DateTime, Utc};
use slotsync_core::{FetchPeriod, FetchStatus};
use sqlx::{PgPool, Postgres, Transaction};

use crate::DbError;

/// A row from the `fetch_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FetchJobRow {
    pub id: i64,
    pub product_id: i64,
    pub fetch_period: i16,
    pub status: i16,
    pub created_at: DateTime<Utc>,
}

impl FetchJobRow {
    /// Decoded fetch period; `None` for an unknown stored number.
    #[must_use]
    pub fn period(&self) -> Option<FetchPeriod> {
        FetchPeriod::from_i16(self.fetch_period)
    }

    /// Decoded status; `None` for an unknown stored number.
    #[must_use]
    pub fn fetch_status(&self) -> Option<FetchStatus> {
        FetchStatus::from_i16(self.status)
    }
}

/// Creates one pending fetch job per product id, in a single batch insert.
///
/// Returns the number of rows inserted (zero when `product_ids` is empty).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn create_fetch_jobs(
    pool: &PgPool,
    product_ids: &[i64],
    period: FetchPeriod,
) -> Result<u64, DbError> {
    if product_ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query(
        "INSERT INTO fetch_jobs (product_id, fetch_period, status) \
         SELECT unnest($1::bigint[]), $2, $3",
    )
    .bind(product_ids)
    .bind(period.as_i16())
    .bind(FetchStatus::Pending.as_i16())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Returns all pending jobs, most urgent period first (fifteen-minutes, then
/// four-hours, then daily), FIFO within a period.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn list_pending_jobs(pool: &PgPool) -> Result<Vec<FetchJobRow>, DbError> {
    let rows = sqlx::query_as::<_, FetchJobRow>(
        "SELECT id, product_id, fetch_period, status, created_at \
         FROM fetch_jobs \
         WHERE status = $1 \
         ORDER BY CASE fetch_period WHEN 2 THEN 1 WHEN 1 THEN 2 ELSE 3 END, id",
    )
    .bind(FetchStatus::Pending.as_i16())
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Promotes a pending job to in-progress inside the caller's transaction.
///
/// Runs in the same transaction as the queue enqueue so a crash cannot leave
/// an enqueued job still marked pending.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not pending, or
/// [`DbError::Sqlx`] if the update fails.
pub async fn mark_job_in_progress_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE fetch_jobs SET status = $1 WHERE id = $2 AND status = $3")
        .bind(FetchStatus::InProgress.as_i16())
        .bind(id)
        .bind(FetchStatus::Pending.as_i16())
        .execute(&mut **tx)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "pending",
        });
    }

    Ok(())
}

/// Marks an in-progress job as completed.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not in progress,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_fetch_job(pool: &PgPool, id: i64) -> Result<(), DbError> {
    terminal_transition(pool, id, FetchStatus::Completed).await
}

/// Marks an in-progress job as failed.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not in progress,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_fetch_job(pool: &PgPool, id: i64) -> Result<(), DbError> {
    terminal_transition(pool, id, FetchStatus::Failed).await
}

async fn terminal_transition(pool: &PgPool, id: i64, to: FetchStatus) -> Result<(), DbError> {
    let result = sqlx::query("UPDATE fetch_jobs SET status = $1 WHERE id = $2 AND status = $3")
        .bind(to.as_i16())
        .bind(id)
        .bind(FetchStatus::InProgress.as_i16())
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "in-progress",
        });
    }

    Ok(())
}

/// Fetches a single job by id.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row exists with the given `id`, or
/// [`DbError::Sqlx`] if the query fails.
pub async fn get_fetch_job(pool: &PgPool, id: i64) -> Result<FetchJobRow, DbError> {
    let row = sqlx::query_as::<_, FetchJobRow>(
        "SELECT id, product_id, fetch_period, status, created_at \
         FROM fetch_jobs \
         WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)?;

    Ok(row)
}
