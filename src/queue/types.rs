use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::QueueSettings;

/// Work item payload: the document to process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentJob {
    /// Document to process.
    pub document_id: String,
    /// Owning collection.
    pub collection_id: String,
}

/// Delivery options attached to an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// While a job with this key is waiting or running, further enqueues are no-ops.
    pub singleton_key: Option<String>,
    /// Redeliveries allowed after the first attempt.
    pub retry_limit: u32,
    /// Base delay before a redelivery.
    pub retry_delay: Duration,
    /// Double the delay for every subsequent redelivery.
    pub retry_backoff: bool,
    /// An active job not settled within this window is treated as failed.
    pub expire_in: Duration,
}

impl EnqueueOptions {
    /// Options for a document job under `settings`, deduplicated by document id.
    pub fn for_document(settings: &QueueSettings, document_id: &str) -> Self {
        Self {
            singleton_key: Some(document_id.to_string()),
            retry_limit: settings.retry_limit,
            retry_delay: Duration::from_secs(settings.retry_delay_seconds),
            retry_backoff: true,
            expire_in: Duration::from_secs(settings.expire_seconds),
        }
    }

    /// Delay before redelivery number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if !self.retry_backoff || retry <= 1 {
            return self.retry_delay;
        }
        self.retry_delay
            .saturating_mul(1_u32 << (retry - 1).min(16))
    }
}

/// A job handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedJob {
    /// Transport job id.
    pub id: String,
    /// Queue the job came from.
    pub queue: String,
    /// Payload.
    pub payload: DocumentJob,
    /// Redeliveries so far (0 on the first delivery).
    pub retry_count: u32,
}

/// What the transport did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Scheduled for another delivery after `delay`.
    Retrying {
        /// Redelivery number (1-based).
        retry: u32,
        /// Delay before the job becomes visible again.
        delay: Duration,
    },
    /// Retries exhausted or the failure was fatal.
    Failed,
}

/// Queue depth counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Ready to be fetched.
    pub queued: usize,
    /// Claimed by a consumer.
    pub active: usize,
    /// Waiting for a retry delay to elapse.
    pub deferred: usize,
    /// Every job record retained for the queue, settled ones included.
    pub total: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_retry() {
        let options = EnqueueOptions {
            singleton_key: None,
            retry_limit: 3,
            retry_delay: Duration::from_secs(30),
            retry_backoff: true,
            expire_in: Duration::from_secs(60),
        };
        assert_eq!(options.delay_for_retry(1), Duration::from_secs(30));
        assert_eq!(options.delay_for_retry(2), Duration::from_secs(60));
        assert_eq!(options.delay_for_retry(3), Duration::from_secs(120));

        let flat = EnqueueOptions {
            retry_backoff: false,
            ..options
        };
        assert_eq!(flat.delay_for_retry(3), Duration::from_secs(30));
    }

    #[test]
    fn document_options_follow_settings() {
        let settings = QueueSettings::default();
        let options = EnqueueOptions::for_document(&settings, "doc-1");
        assert_eq!(options.singleton_key.as_deref(), Some("doc-1"));
        assert_eq!(options.retry_limit, settings.retry_limit);
        assert!(options.expire_in < Duration::from_secs(24 * 60 * 60));
    }
}
