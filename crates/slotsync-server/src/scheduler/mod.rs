//! Background job scheduler.
//!
//! Initialises a [`JobScheduler`] at server startup and registers the three
//! fetch-job creation cadences plus the queue-dispatch cadence.
//!
//! The dispatch interval (20 minutes) is deliberately longer than the
//! shortest creation cadence (15 minutes) so every job created by a firing
//! is committed and visible before the next dispatch run reads the table.

use std::sync::Arc;

use slotsync_core::FetchPeriod;
use sqlx::PgPool;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::dispatch;

const FIFTEEN_MINUTES_CRON: &str = "0 */15 * * * *";
const FOUR_HOURS_CRON: &str = "0 0 */4 * * *";
const DAILY_CRON: &str = "0 0 0 * * *";
const DISPATCH_CRON: &str = "0 */20 * * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(pool: PgPool) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let pool = Arc::new(pool);

    register_creation_job(
        &scheduler,
        Arc::clone(&pool),
        FetchPeriod::FifteenMinutes,
        FIFTEEN_MINUTES_CRON,
    )
    .await?;
    register_creation_job(
        &scheduler,
        Arc::clone(&pool),
        FetchPeriod::FourHours,
        FOUR_HOURS_CRON,
    )
    .await?;
    register_creation_job(&scheduler, Arc::clone(&pool), FetchPeriod::Daily, DAILY_CRON).await?;
    register_dispatch_job(&scheduler, pool).await?;

    scheduler.start().await?;
    Ok(scheduler)
}

/// Register one fetch-job creation cadence.
async fn register_creation_job(
    scheduler: &JobScheduler,
    pool: Arc<PgPool>,
    period: FetchPeriod,
    cron: &str,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(cron, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            tracing::info!(%period, "scheduler: starting fetch-job creation run");
            run_create_fetch_jobs(&pool, period).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Register the queue-dispatch cadence.
async fn register_dispatch_job(
    scheduler: &JobScheduler,
    pool: Arc<PgPool>,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async(DISPATCH_CRON, move |_uuid, _lock| {
        let pool = Arc::clone(&pool);

        Box::pin(async move {
            tracing::info!("scheduler: starting queue-dispatch run");
            dispatch::run_dispatch(&pool).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

/// Creates one pending fetch job per fetch-enabled product for `period`.
///
/// Errors end the run; the next scheduled firing starts fresh, so there is
/// no explicit retry here.
pub async fn run_create_fetch_jobs(pool: &PgPool, period: FetchPeriod) {
    let products = match slotsync_db::list_fetch_enabled_products(pool).await {
        Ok(products) => products,
        Err(e) => {
            tracing::error!(%period, error = %e, "scheduler: failed to load fetch-enabled products");
            return;
        }
    };

    if products.is_empty() {
        tracing::warn!(%period, "scheduler: no fetch-enabled products; skipping job creation");
        return;
    }

    match slotsync_db::create_fetch_jobs(pool, &products, period).await {
        Ok(count) => {
            tracing::info!(%period, count, "scheduler: created fetch jobs");
        }
        Err(e) => {
            tracing::error!(%period, error = %e, "scheduler: failed to create fetch jobs");
        }
    }
}
