//! Queue dispatch: promotes pending fetch jobs into the dispatch queue.

use slotsync_db::FetchJobRow;
use slotsync_queue::NewQueueJob;
use sqlx::PgPool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("fetch job {id} carries unknown fetch period {period}")]
    UnknownPeriod { id: i64, period: i16 },
    #[error(transparent)]
    Db(#[from] slotsync_db::DbError),
    #[error(transparent)]
    Queue(#[from] slotsync_queue::QueueError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Reads all pending fetch jobs in priority order and publishes each to the
/// dispatch queue, marking it in-progress.
///
/// A failure on one job is logged and dispatch continues with the rest; the
/// failed job stays pending and is picked up by the next run.
pub async fn run_dispatch(pool: &PgPool) {
    let jobs = match slotsync_db::list_pending_jobs(pool).await {
        Ok(jobs) => jobs,
        Err(e) => {
            tracing::error!(error = %e, "dispatch: failed to list pending jobs");
            return;
        }
    };

    if jobs.is_empty() {
        tracing::debug!("dispatch: no pending jobs");
        return;
    }

    tracing::info!(count = jobs.len(), "dispatch: enqueueing pending jobs");

    for job in &jobs {
        match dispatch_one(pool, job).await {
            Ok(priority) => {
                tracing::info!(
                    job_id = job.id,
                    product_id = job.product_id,
                    priority,
                    "dispatch: job enqueued"
                );
            }
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "dispatch: failed to enqueue job");
            }
        }
    }
}

/// Enqueues one job and marks it in-progress in a single transaction, so a
/// crash mid-dispatch cannot leave an enqueued job still pending.
async fn dispatch_one(pool: &PgPool, job: &FetchJobRow) -> Result<i16, DispatchError> {
    let period = job.period().ok_or(DispatchError::UnknownPeriod {
        id: job.id,
        period: job.fetch_period,
    })?;

    let mut tx = pool.begin().await?;
    slotsync_queue::enqueue_tx(
        &mut tx,
        NewQueueJob {
            fetch_job_id: job.id,
            product_id: job.product_id,
            fetch_period: period,
        },
    )
    .await?;
    slotsync_db::mark_job_in_progress_tx(&mut tx, job.id).await?;
    tx.commit().await?;

    Ok(period.priority())
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotsync_core::{FetchPeriod, FetchStatus};

    #[sqlx::test(migrations = "../../migrations")]
    async fn dispatch_promotes_pending_jobs_and_orders_queue_by_priority(pool: sqlx::PgPool) {
        // Daily created before fifteen-minutes; the queue must still hand
        // out the fifteen-minutes entry first.
        slotsync_db::create_fetch_jobs(&pool, &[101], FetchPeriod::Daily)
            .await
            .expect("daily job");
        slotsync_db::create_fetch_jobs(&pool, &[102], FetchPeriod::FifteenMinutes)
            .await
            .expect("fifteen-minutes job");

        run_dispatch(&pool).await;

        let pending = slotsync_db::list_pending_jobs(&pool).await.expect("list");
        assert!(pending.is_empty(), "all jobs should be in progress");

        let entries = slotsync_queue::list_entries(&pool).await.expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].product_id, 102);
        assert_eq!(entries[0].period(), Some(FetchPeriod::FifteenMinutes));
        assert_eq!(entries[1].product_id, 101);

        let mut tx = pool.begin().await.expect("begin");
        let claimed = slotsync_queue::claim_next_tx(&mut tx, 60)
            .await
            .expect("claim")
            .expect("entry");
        assert_eq!(claimed.product_id, 102);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn dispatch_marks_jobs_in_progress(pool: sqlx::PgPool) {
        slotsync_db::create_fetch_jobs(&pool, &[101], FetchPeriod::FourHours)
            .await
            .expect("job");
        let job_id = slotsync_db::list_pending_jobs(&pool).await.expect("list")[0].id;

        run_dispatch(&pool).await;

        let job = slotsync_db::get_fetch_job(&pool, job_id).await.expect("get");
        assert_eq!(job.fetch_status(), Some(FetchStatus::InProgress));
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn dispatch_with_empty_backlog_is_a_no_op(pool: sqlx::PgPool) {
        run_dispatch(&pool).await;
        assert_eq!(slotsync_queue::queue_depth(&pool).await.expect("depth"), 0);
    }

    #[sqlx::test(migrations = "../../migrations")]
    async fn repeated_dispatch_does_not_requeue_in_progress_jobs(pool: sqlx::PgPool) {
        slotsync_db::create_fetch_jobs(&pool, &[101], FetchPeriod::FifteenMinutes)
            .await
            .expect("job");

        run_dispatch(&pool).await;
        run_dispatch(&pool).await;

        assert_eq!(slotsync_queue::queue_depth(&pool).await.expect("depth"), 1);
    }
}
