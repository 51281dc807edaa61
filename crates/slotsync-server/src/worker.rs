//! The fetch worker: a single sequential consumer of the dispatch queue.
//!
//! One entry is processed at a time. The claim transaction stays open for
//! the duration of the fetch, keeping the row locked; a worker crash rolls
//! the claim back and the entry becomes claimable again. Fetch throughput is
//! therefore bounded to one job in flight, independent of the provider-call
//! quota enforced inside the fetcher.

use std::time::Duration;

use rand::Rng;
use slotsync_core::AppConfig;
use slotsync_provider::{InventorySink, RateLimitedFetcher};
use slotsync_queue::QueuedJobRow;
use sqlx::PgPool;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Db(#[from] slotsync_db::DbError),
    #[error(transparent)]
    Queue(#[from] slotsync_queue::QueueError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub struct FetchWorker<S: InventorySink> {
    pool: PgPool,
    fetcher: RateLimitedFetcher<S>,
    poll_interval: Duration,
    jitter: Duration,
    max_attempts: u32,
    backoff_base_secs: u64,
    shutdown: watch::Receiver<bool>,
}

impl<S: InventorySink> FetchWorker<S> {
    #[must_use]
    pub fn new(
        pool: PgPool,
        fetcher: RateLimitedFetcher<S>,
        config: &AppConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            fetcher,
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            jitter: Duration::from_millis(config.worker_poll_jitter_ms),
            max_attempts: config.queue_max_attempts,
            backoff_base_secs: config.queue_backoff_base_secs,
            shutdown,
        }
    }

    /// Calculate the sleep duration with random jitter applied.
    fn sleep_duration_with_jitter(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.poll_interval;
        }

        let jitter_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let random_jitter = rand::rng().random_range(0..=jitter_millis);
        self.poll_interval + Duration::from_millis(random_jitter)
    }

    /// Consume queue entries until shutdown is signalled. An in-flight entry
    /// always finishes before the loop exits.
    pub async fn run(mut self) {
        tracing::info!("fetch worker started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            match self.run_next_job().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    let sleep = self.sleep_duration_with_jitter();
                    tokio::select! {
                        () = tokio::time::sleep(sleep) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "failed to run queued job");
                    let sleep = self.sleep_duration_with_jitter();
                    tokio::select! {
                        () = tokio::time::sleep(sleep) => {}
                        _ = self.shutdown.changed() => {}
                    }
                }
            }
        }
        tracing::info!("fetch worker stopped");
    }

    /// Claim and process the next ready queue entry.
    ///
    /// Returns:
    /// - `Ok(Some(queue_id))` if an entry was processed
    /// - `Ok(None)` if the queue had no ready entry
    /// - `Err(...)` if claiming or bookkeeping failed
    async fn run_next_job(&self) -> Result<Option<i64>, WorkerError> {
        let mut tx = self.pool.begin().await?;

        let Some(entry) = slotsync_queue::claim_next_tx(&mut tx, self.backoff_base_secs).await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        let Some(period) = entry.period() else {
            tracing::error!(
                queue_id = entry.id,
                fetch_period = entry.fetch_period,
                "queue entry carries unknown fetch period; discarding"
            );
            slotsync_queue::delete_job_tx(&mut tx, entry.id).await?;
            tx.commit().await?;
            self.record_permanent_failure(&entry).await;
            return Ok(Some(entry.id));
        };

        let attempt = u32::try_from(entry.retries).unwrap_or(0).saturating_add(1);
        tracing::info!(
            queue_id = entry.id,
            fetch_job_id = entry.fetch_job_id,
            product_id = entry.product_id,
            %period,
            attempt,
            "processing job"
        );

        match self.fetcher.fetch_product_data(entry.product_id, period).await {
            Ok(report) => {
                slotsync_queue::delete_job_tx(&mut tx, entry.id).await?;
                tx.commit().await?;

                if let Err(error) =
                    slotsync_db::complete_fetch_job(&self.pool, entry.fetch_job_id).await
                {
                    tracing::error!(
                        fetch_job_id = entry.fetch_job_id,
                        %error,
                        "failed to record completed status"
                    );
                } else {
                    tracing::info!(
                        fetch_job_id = entry.fetch_job_id,
                        days = report.days_fetched,
                        slots = report.slots_synced,
                        "job completed"
                    );
                }
            }
            Err(error) => {
                if attempt >= self.max_attempts {
                    tracing::error!(
                        fetch_job_id = entry.fetch_job_id,
                        %error,
                        attempts = attempt,
                        "job permanently failed; no retries remain"
                    );
                    slotsync_queue::delete_job_tx(&mut tx, entry.id).await?;
                    tx.commit().await?;
                    self.record_permanent_failure(&entry).await;
                } else {
                    tracing::warn!(
                        fetch_job_id = entry.fetch_job_id,
                        %error,
                        attempt,
                        "job attempt failed; retrying after backoff"
                    );
                    slotsync_queue::record_failure_tx(&mut tx, entry.id).await?;
                    tx.commit().await?;
                }
            }
        }

        Ok(Some(entry.id))
    }

    /// Record the terminal failed status. A failure of this write itself is
    /// logged and nothing further is attempted.
    async fn record_permanent_failure(&self, entry: &QueuedJobRow) {
        if let Err(error) = slotsync_db::fail_fetch_job(&self.pool, entry.fetch_job_id).await {
            tracing::error!(
                fetch_job_id = entry.fetch_job_id,
                %error,
                "failed to record failed status"
            );
        }
    }
}
