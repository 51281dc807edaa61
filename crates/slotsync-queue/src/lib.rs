//! Persistent priority dispatch queue backed by Postgres.
//!
//! Entries live in the `queue_jobs` table, so the queue survives restarts
//! and can be shared by producers and consumers in different processes.
//! Consumers claim the most urgent ready entry with `FOR UPDATE SKIP
//! LOCKED` inside their own transaction: the row stays locked while the
//! entry is being worked, concurrent consumers skip past it, and a consumer
//! crash releases the lock so the entry becomes claimable again.
//!
//! Lower `priority` numbers dequeue first; ties break FIFO by id. A failed
//! attempt bumps `retries` and stamps `last_attempt_at`; the claim query
//! hides the entry until its exponential-backoff deadline has passed, so
//! retry pacing needs no timers on the consumer side.

use thiserror::Error;

pub mod storage;

pub use storage::{
    claim_next_tx, delete_job_tx, enqueue_tx, list_entries, queue_depth, record_failure_tx,
    NewQueueJob, QueuedJobRow,
};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}
