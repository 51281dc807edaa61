//! SQL operations on the `queue_jobs` table.

use chrono::{DateTime, Utc};
use slotsync_core::FetchPeriod;
use sqlx::{PgPool, Postgres, Transaction};

use crate::QueueError;

/// A claimed or inspected row from the `queue_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct QueuedJobRow {
    pub id: i64,
    pub fetch_job_id: i64,
    pub product_id: i64,
    pub fetch_period: i16,
    pub priority: i16,
    pub retries: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl QueuedJobRow {
    /// Decoded fetch period; `None` for an unknown stored number.
    #[must_use]
    pub fn period(&self) -> Option<FetchPeriod> {
        FetchPeriod::from_i16(self.fetch_period)
    }
}

/// A new entry to publish into the dispatch queue.
#[derive(Debug, Clone, Copy)]
pub struct NewQueueJob {
    pub fetch_job_id: i64,
    pub product_id: i64,
    pub fetch_period: FetchPeriod,
}

/// Inserts a queue entry inside the caller's transaction.
///
/// The priority is derived from the fetch period (shortest period first).
/// Runs in the producer's transaction so the enqueue commits atomically
/// with whatever bookkeeping the producer does alongside it.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the insert fails.
pub async fn enqueue_tx(
    tx: &mut Transaction<'_, Postgres>,
    job: NewQueueJob,
) -> Result<i64, QueueError> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO queue_jobs (fetch_job_id, product_id, fetch_period, priority) \
         VALUES ($1, $2, $3, $4) \
         RETURNING id",
    )
    .bind(job.fetch_job_id)
    .bind(job.product_id)
    .bind(job.fetch_period.as_i16())
    .bind(job.fetch_period.priority())
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Claims the most urgent ready entry, or `None` when the queue is empty.
///
/// An entry is ready when it has never been attempted, or when its
/// exponential-backoff deadline (`last_attempt_at + backoff_base_secs *
/// 2^(retries-1)`) has passed. The returned row is locked until the
/// caller's transaction commits or rolls back; other consumers skip it.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the query fails.
pub async fn claim_next_tx(
    tx: &mut Transaction<'_, Postgres>,
    backoff_base_secs: u64,
) -> Result<Option<QueuedJobRow>, QueueError> {
    let row = sqlx::query_as::<_, QueuedJobRow>(
        "SELECT id, fetch_job_id, product_id, fetch_period, priority, \
                retries, last_attempt_at, created_at \
         FROM queue_jobs \
         WHERE retries = 0 \
            OR last_attempt_at < NOW() - INTERVAL '1 second' * $1 * POWER(2, retries - 1) \
         ORDER BY priority ASC, id ASC \
         FOR UPDATE SKIP LOCKED \
         LIMIT 1",
    )
    .bind(backoff_base_secs as f64)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row)
}

/// Deletes a finished entry (completed, or permanently failed) inside the
/// claiming transaction.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the delete fails.
pub async fn delete_job_tx(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<(), QueueError> {
    sqlx::query("DELETE FROM queue_jobs WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Records a failed attempt: bumps `retries` and stamps `last_attempt_at`,
/// which starts the backoff clock for the next claim.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the update fails.
pub async fn record_failure_tx(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> Result<(), QueueError> {
    sqlx::query("UPDATE queue_jobs SET retries = retries + 1, last_attempt_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

/// Number of entries currently in the queue, ready or not.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the query fails.
pub async fn queue_depth(pool: &PgPool) -> Result<i64, QueueError> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM queue_jobs")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Returns all entries in claim order, without locking. Inspection only.
///
/// # Errors
///
/// Returns [`QueueError::Sqlx`] if the query fails.
pub async fn list_entries(pool: &PgPool) -> Result<Vec<QueuedJobRow>, QueueError> {
    let rows = sqlx::query_as::<_, QueuedJobRow>(
        "SELECT id, fetch_job_id, product_id, fetch_period, priority, \
                retries, last_attempt_at, created_at \
         FROM queue_jobs \
         ORDER BY priority ASC, id ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
