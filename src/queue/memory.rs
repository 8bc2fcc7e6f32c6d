use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::QueueSettings;

use super::types::{DocumentJob, EnqueueOptions, FailureDisposition, QueueStats, QueuedJob};
use super::{QueueError, QueueTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Created,
    Retry,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl State {
    fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Retry | Self::Active)
    }

    fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Retry => "retry",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug)]
struct Entry {
    seq: u64,
    queue: String,
    payload: DocumentJob,
    options: EnqueueOptions,
    state: State,
    retry_count: u32,
    start_after: Instant,
    started_at: Option<Instant>,
    settled_at: Option<Instant>,
    last_error: Option<String>,
}

impl Entry {
    fn settle(&mut self, state: State, now: Instant) {
        self.state = state;
        self.started_at = None;
        self.settled_at = Some(now);
    }

    fn is_ready(&self, now: Instant) -> bool {
        matches!(self.state, State::Created | State::Retry) && self.start_after <= now
    }

    fn settle_failure(&mut self, error: &str, retryable: bool, now: Instant) -> FailureDisposition {
        self.last_error = Some(error.to_string());
        self.started_at = None;
        if retryable && self.retry_count < self.options.retry_limit {
            self.retry_count += 1;
            let delay = self.options.delay_for_retry(self.retry_count);
            self.state = State::Retry;
            self.start_after = now + delay;
            FailureDisposition::Retrying {
                retry: self.retry_count,
                delay,
            }
        } else {
            self.settle(State::Failed, now);
            FailureDisposition::Failed
        }
    }
}

#[derive(Default)]
struct Jobs {
    next_seq: u64,
    entries: HashMap<String, Entry>,
}

impl Jobs {
    /// Drop settled jobs older than `retention`; returns how many were evicted.
    fn evict_settled(&mut self, retention: Duration, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            !(entry.state.is_settled()
                && entry
                    .settled_at
                    .is_some_and(|settled| now.duration_since(settled) >= retention))
        });
        before - self.entries.len()
    }
}

/// Process-local queue transport with singleton keys, retries with backoff, and expiration.
///
/// Completed, failed, and cancelled jobs stay queryable for `retention` and are evicted on the
/// next poll after that.
pub struct InMemoryQueue {
    jobs: Mutex<Jobs>,
    retention: Duration,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::with_retention(QueueSettings::default().retention())
    }
}

impl InMemoryQueue {
    /// Empty queue with the default retention.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty queue that keeps settled jobs for `retention`.
    pub fn with_retention(retention: Duration) -> Self {
        Self {
            jobs: Mutex::new(Jobs::default()),
            retention,
        }
    }

    /// Last failure message recorded for a job.
    pub async fn last_error(&self, job_id: &str) -> Option<String> {
        let jobs = self.jobs.lock().await;
        jobs.entries
            .get(job_id)
            .and_then(|entry| entry.last_error.clone())
    }
}

#[async_trait]
impl QueueTransport for InMemoryQueue {
    async fn enqueue(
        &self,
        queue: &str,
        payload: DocumentJob,
        options: EnqueueOptions,
    ) -> Result<Option<String>, QueueError> {
        let mut jobs = self.jobs.lock().await;
        if let Some(key) = options.singleton_key.as_deref() {
            let duplicate = jobs.entries.values().any(|entry| {
                entry.queue == queue
                    && entry.state.is_live()
                    && entry.options.singleton_key.as_deref() == Some(key)
            });
            if duplicate {
                tracing::debug!(queue, singleton_key = key, "Singleton job already live");
                return Ok(None);
            }
        }

        let id = uuid::Uuid::new_v4().to_string();
        let seq = jobs.next_seq;
        jobs.next_seq += 1;
        jobs.entries.insert(
            id.clone(),
            Entry {
                seq,
                queue: queue.to_string(),
                payload,
                options,
                state: State::Created,
                retry_count: 0,
                start_after: Instant::now(),
                started_at: None,
                settled_at: None,
                last_error: None,
            },
        );
        Ok(Some(id))
    }

    async fn fetch(&self, queue: &str, batch_size: usize) -> Result<Vec<QueuedJob>, QueueError> {
        let now = Instant::now();
        let mut jobs = self.jobs.lock().await;

        let evicted = jobs.evict_settled(self.retention, now);
        if evicted > 0 {
            tracing::debug!(queue, evicted, "Evicted settled jobs past retention");
        }

        for (id, entry) in jobs.entries.iter_mut() {
            let expired = entry.state == State::Active
                && entry
                    .started_at
                    .is_some_and(|started| now.duration_since(started) >= entry.options.expire_in);
            if expired {
                let disposition = entry.settle_failure("job expired before completion", true, now);
                tracing::warn!(job_id = %id, queue = %entry.queue, ?disposition, "Active job expired");
            }
        }

        let mut ready: Vec<(&String, &mut Entry)> = jobs
            .entries
            .iter_mut()
            .filter(|(_, entry)| entry.queue == queue && entry.is_ready(now))
            .collect();
        ready.sort_by_key(|(_, entry)| entry.seq);

        let claimed = ready
            .into_iter()
            .take(batch_size.max(1))
            .map(|(id, entry)| {
                entry.state = State::Active;
                entry.started_at = Some(now);
                QueuedJob {
                    id: id.clone(),
                    queue: entry.queue.clone(),
                    payload: entry.payload.clone(),
                    retry_count: entry.retry_count,
                }
            })
            .collect();
        Ok(claimed)
    }

    async fn complete(&self, job_id: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        if entry.state != State::Active {
            return Err(QueueError::InvalidState {
                id: job_id.to_string(),
                state: entry.state.label(),
            });
        }
        entry.settle(State::Completed, Instant::now());
        Ok(())
    }

    async fn fail(
        &self,
        job_id: &str,
        error: &str,
        retryable: bool,
    ) -> Result<FailureDisposition, QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        if entry.state != State::Active {
            return Err(QueueError::InvalidState {
                id: job_id.to_string(),
                state: entry.state.label(),
            });
        }
        Ok(entry.settle_failure(error, retryable, Instant::now()))
    }

    async fn cancel(&self, job_id: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        if entry.state.is_live() {
            entry.settle(State::Cancelled, Instant::now());
        }
        Ok(())
    }

    async fn resume(&self, job_id: &str) -> Result<(), QueueError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .entries
            .get_mut(job_id)
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        if entry.state != State::Cancelled {
            return Err(QueueError::InvalidState {
                id: job_id.to_string(),
                state: entry.state.label(),
            });
        }
        entry.state = State::Created;
        entry.start_after = Instant::now();
        entry.settled_at = None;
        Ok(())
    }

    async fn stats(&self, queue: &str) -> Result<QueueStats, QueueError> {
        let now = Instant::now();
        let jobs = self.jobs.lock().await;
        let mut stats = QueueStats::default();
        for entry in jobs.entries.values().filter(|entry| entry.queue == queue) {
            stats.total += 1;
            match entry.state {
                State::Active => stats.active += 1,
                State::Created | State::Retry if entry.start_after > now => stats.deferred += 1,
                State::Created | State::Retry => stats.queued += 1,
                State::Completed | State::Failed | State::Cancelled => {}
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const QUEUE: &str = "document-processing";

    fn payload(document_id: &str) -> DocumentJob {
        DocumentJob {
            document_id: document_id.to_string(),
            collection_id: "col-1".into(),
        }
    }

    fn options(document_id: &str, retry_limit: u32, retry_delay: Duration) -> EnqueueOptions {
        EnqueueOptions {
            singleton_key: Some(document_id.to_string()),
            retry_limit,
            retry_delay,
            retry_backoff: true,
            expire_in: Duration::from_secs(600),
        }
    }

    #[tokio::test]
    async fn singleton_key_dedupes_live_jobs() {
        let queue = InMemoryQueue::new();
        let first = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 1, Duration::ZERO))
            .await
            .unwrap();
        assert!(first.is_some());
        let second = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 1, Duration::ZERO))
            .await
            .unwrap();
        assert!(second.is_none());

        let claimed = queue.fetch(QUEUE, 5).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert!(
            queue
                .enqueue(QUEUE, payload("doc-1"), options("doc-1", 1, Duration::ZERO))
                .await
                .unwrap()
                .is_none(),
            "active jobs still dedupe"
        );

        queue.complete(&claimed[0].id).await.unwrap();
        assert!(
            queue
                .enqueue(QUEUE, payload("doc-1"), options("doc-1", 1, Duration::ZERO))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn fetch_claims_in_enqueue_order_up_to_batch() {
        let queue = InMemoryQueue::new();
        for id in ["a", "b", "c"] {
            queue
                .enqueue(QUEUE, payload(id), options(id, 0, Duration::ZERO))
                .await
                .unwrap();
        }
        let batch = queue.fetch(QUEUE, 2).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|job| job.payload.document_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(
            queue.stats(QUEUE).await.unwrap(),
            QueueStats {
                queued: 1,
                active: 2,
                deferred: 0,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn retryable_failures_back_off_until_exhausted() {
        let queue = InMemoryQueue::new();
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 2, Duration::from_secs(30)))
            .await
            .unwrap()
            .expect("job id");
        queue.fetch(QUEUE, 1).await.unwrap();

        let disposition = queue.fail(&id, "provider down", true).await.unwrap();
        assert_eq!(
            disposition,
            FailureDisposition::Retrying {
                retry: 1,
                delay: Duration::from_secs(30)
            }
        );
        let stats = queue.stats(QUEUE).await.unwrap();
        assert_eq!(stats.deferred, 1);
        assert!(queue.fetch(QUEUE, 1).await.unwrap().is_empty());
        assert_eq!(queue.last_error(&id).await.as_deref(), Some("provider down"));
    }

    #[tokio::test]
    async fn fatal_failures_do_not_retry() {
        let queue = InMemoryQueue::new();
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 3, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        queue.fetch(QUEUE, 1).await.unwrap();
        assert_eq!(
            queue.fail(&id, "not found", false).await.unwrap(),
            FailureDisposition::Failed
        );
        assert!(queue.fetch(QUEUE, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn retries_redeliver_with_incremented_count() {
        let queue = InMemoryQueue::new();
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 1, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        queue.fetch(QUEUE, 1).await.unwrap();
        queue.fail(&id, "boom", true).await.unwrap();

        let redelivered = queue.fetch(QUEUE, 1).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].retry_count, 1);
        assert_eq!(
            queue.fail(&id, "boom", true).await.unwrap(),
            FailureDisposition::Failed
        );
    }

    #[tokio::test]
    async fn expired_active_jobs_are_failed_and_rescheduled() {
        let queue = InMemoryQueue::new();
        let mut opts = options("doc-1", 1, Duration::ZERO);
        opts.expire_in = Duration::ZERO;
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), opts)
            .await
            .unwrap()
            .expect("job id");
        queue.fetch(QUEUE, 1).await.unwrap();

        let redelivered = queue.fetch(QUEUE, 1).await.unwrap();
        assert_eq!(redelivered.len(), 1);
        assert_eq!(redelivered[0].id, id);
        assert_eq!(
            queue.last_error(&id).await.as_deref(),
            Some("job expired before completion")
        );
    }

    #[tokio::test]
    async fn settled_jobs_are_evicted_after_retention() {
        let queue = InMemoryQueue::with_retention(Duration::ZERO);
        let done = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 0, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        let cancelled = queue
            .enqueue(QUEUE, payload("doc-2"), options("doc-2", 0, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        queue.cancel(&cancelled).await.unwrap();
        queue.fetch(QUEUE, 1).await.unwrap();
        queue.complete(&done).await.unwrap();
        let waiting = queue
            .enqueue(QUEUE, payload("doc-3"), options("doc-3", 0, Duration::from_secs(60)))
            .await
            .unwrap()
            .expect("job id");
        assert_eq!(
            queue.stats(QUEUE).await.unwrap().total,
            2,
            "cancelled job was dropped on the first poll"
        );

        let claimed = queue.fetch(QUEUE, 5).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id, waiting);
        assert_eq!(queue.stats(QUEUE).await.unwrap().total, 1);
        assert!(matches!(
            queue.resume(&cancelled).await,
            Err(QueueError::NotFound(_))
        ));
        assert!(queue.last_error(&done).await.is_none());
    }

    #[tokio::test]
    async fn settled_jobs_are_kept_within_retention() {
        let queue = InMemoryQueue::with_retention(Duration::from_secs(3600));
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 0, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        queue.fetch(QUEUE, 1).await.unwrap();
        queue.fail(&id, "fatal", false).await.unwrap();

        queue.fetch(QUEUE, 1).await.unwrap();
        assert_eq!(queue.stats(QUEUE).await.unwrap().total, 1);
        assert_eq!(queue.last_error(&id).await.as_deref(), Some("fatal"));
    }

    #[tokio::test]
    async fn cancel_and_resume() {
        let queue = InMemoryQueue::new();
        let id = queue
            .enqueue(QUEUE, payload("doc-1"), options("doc-1", 0, Duration::ZERO))
            .await
            .unwrap()
            .expect("job id");
        queue.cancel(&id).await.unwrap();
        assert!(queue.fetch(QUEUE, 1).await.unwrap().is_empty());
        assert!(matches!(
            queue.complete(&id).await,
            Err(QueueError::InvalidState { .. })
        ));

        queue.resume(&id).await.unwrap();
        assert_eq!(queue.fetch(QUEUE, 1).await.unwrap().len(), 1);
        assert!(matches!(
            queue.resume("missing").await,
            Err(QueueError::NotFound(_))
        ));
    }
}
