use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::{config::QueueSettings, processing::PipelineOrchestrator};

use super::types::{FailureDisposition, QueuedJob};
use super::{QueueError, QueueTransport};

/// Polls the queue and runs each claimed job through the orchestrator to completion.
pub struct QueueConsumer {
    name: String,
    queue: Arc<dyn QueueTransport>,
    orchestrator: Arc<PipelineOrchestrator>,
    settings: QueueSettings,
}

impl QueueConsumer {
    /// Consumer identified as `name` in logs.
    pub fn new(
        name: impl Into<String>,
        queue: Arc<dyn QueueTransport>,
        orchestrator: Arc<PipelineOrchestrator>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            orchestrator,
            settings,
        }
    }

    /// Claim one batch and process it sequentially; returns the number of jobs handled.
    pub async fn poll_once(&self) -> Result<usize, QueueError> {
        let jobs = self
            .queue
            .fetch(&self.settings.name, self.settings.batch_size)
            .await?;
        for job in &jobs {
            self.handle(job).await;
        }
        Ok(jobs.len())
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(consumer = %self.name, queue = %self.settings.name, "Queue consumer started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            let idle = match self.poll_once().await {
                Ok(handled) => handled == 0,
                Err(error) => {
                    tracing::error!(consumer = %self.name, error = %error, "Queue poll failed");
                    true
                }
            };
            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.settings.poll_interval()) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
        tracing::info!(consumer = %self.name, "Queue consumer stopped");
    }

    /// Settle errors are logged so one job the queue no longer tracks (cancelled mid-run, for
    /// example) does not strand the rest of the batch.
    async fn handle(&self, job: &QueuedJob) {
        let document_id = job.payload.document_id.as_str();
        let span = tracing::info_span!(
            "queue_job",
            consumer = %self.name,
            job_id = %job.id,
            document_id,
            retry = job.retry_count
        );

        let result = self
            .orchestrator
            .process_document(document_id, Some(&job.id))
            .instrument(span)
            .await;

        match result {
            Ok(outcome) => match self.queue.complete(&job.id).await {
                Ok(()) => tracing::info!(
                    job_id = %job.id,
                    document_id,
                    chunks = outcome.chunk_count,
                    "Queue job completed"
                ),
                Err(settle) => self.log_settle_failure(job, "complete", &settle),
            },
            Err(error) => {
                match self
                    .queue
                    .fail(&job.id, &error.to_string(), error.is_retryable())
                    .await
                {
                    Ok(FailureDisposition::Retrying { retry, delay }) => tracing::warn!(
                        job_id = %job.id,
                        document_id,
                        retry,
                        delay_seconds = delay.as_secs(),
                        "Queue job will be redelivered"
                    ),
                    Ok(FailureDisposition::Failed) => tracing::error!(
                        job_id = %job.id,
                        document_id,
                        retryable = error.is_retryable(),
                        "Queue job failed permanently; operator retry required"
                    ),
                    Err(settle) => self.log_settle_failure(job, "fail", &settle),
                }
            }
        }
    }

    fn log_settle_failure(&self, job: &QueuedJob, action: &'static str, error: &QueueError) {
        tracing::warn!(
            consumer = %self.name,
            job_id = %job.id,
            document_id = %job.payload.document_id,
            action,
            error = %error,
            "Could not settle queue job"
        );
    }
}

/// Spawn `count` consumers sharing one queue and orchestrator.
pub fn spawn_consumers(
    count: usize,
    worker_id: &str,
    queue: Arc<dyn QueueTransport>,
    orchestrator: Arc<PipelineOrchestrator>,
    settings: &QueueSettings,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|index| {
            let consumer = QueueConsumer::new(
                format!("{worker_id}-{index}"),
                Arc::clone(&queue),
                Arc::clone(&orchestrator),
                settings.clone(),
            );
            tokio::spawn(consumer.run(shutdown.clone()))
        })
        .collect()
}
