//! Queue transport seam plus the pieces built on it.
//!
//! Delivery is at-least-once. The orchestrator's stage map makes redelivery cheap, so the
//! transport only has to guarantee that one document has at most one live job at a time
//! (singleton key) and that failed jobs come back after a bounded, growing delay.

mod consumer;
mod dispatcher;
mod memory;
/// Job payloads, delivery options, and queue counters.
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use consumer::{QueueConsumer, spawn_consumers};
pub use dispatcher::{DispatchError, Dispatcher, EnqueueReceipt};
pub use memory::InMemoryQueue;
pub use types::{DocumentJob, EnqueueOptions, FailureDisposition, QueueStats, QueuedJob};

/// Errors raised by a [`QueueTransport`].
#[derive(Debug, Error)]
pub enum QueueError {
    /// Unknown job id.
    #[error("Queue job '{0}' not found")]
    NotFound(String),
    /// Operation does not apply to the job's current state.
    #[error("Queue job '{id}' is {state}")]
    InvalidState {
        /// Job id.
        id: String,
        /// Current state label.
        state: &'static str,
    },
    /// Transport backend failed.
    #[error("Queue transport failure: {0}")]
    Transport(String),
}

/// At-least-once work queue.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Add a job; `Ok(None)` when a live job with the same singleton key already exists.
    async fn enqueue(
        &self,
        queue: &str,
        payload: DocumentJob,
        options: EnqueueOptions,
    ) -> Result<Option<String>, QueueError>;

    /// Claim up to `batch_size` ready jobs.
    async fn fetch(&self, queue: &str, batch_size: usize) -> Result<Vec<QueuedJob>, QueueError>;

    /// Settle an active job as done.
    async fn complete(&self, job_id: &str) -> Result<(), QueueError>;

    /// Settle an active job as failed; retryable failures are redelivered until the limit.
    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<FailureDisposition, QueueError>;

    /// Stop a waiting or active job from being (re)delivered.
    async fn cancel(&self, job_id: &str) -> Result<(), QueueError>;

    /// Make a cancelled job deliverable again.
    async fn resume(&self, job_id: &str) -> Result<(), QueueError>;

    /// Depth counters for `queue`.
    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError>;
}
