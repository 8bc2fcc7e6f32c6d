use std::sync::Arc;

use thiserror::Error;

use crate::{
    blob::BlobError,
    config::QueueSettings,
    processing::{PipelineError, PipelineOrchestrator},
    store::{Document, DocumentStatus, JobStatus, PipelineStep, ProcessingJob, StageProgress, StoreError},
};

use super::types::{DocumentJob, EnqueueOptions, QueueStats};
use super::{QueueError, QueueTransport};

/// Errors raised by operator actions.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Store, blob, or vector-store failure.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Queue transport failure.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// The job's state does not allow the action.
    #[error("Cannot {action} document '{document_id}' while its job is {status:?}")]
    InvalidState {
        /// Target document.
        document_id: String,
        /// Current job status.
        status: JobStatus,
        /// Rejected action.
        action: &'static str,
    },
}

impl DispatchError {
    /// The target record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Pipeline(PipelineError::NotFound(_)))
    }
}

impl From<StoreError> for DispatchError {
    fn from(error: StoreError) -> Self {
        Self::Pipeline(error.into())
    }
}

impl From<BlobError> for DispatchError {
    fn from(error: BlobError) -> Self {
        Self::Pipeline(error.into())
    }
}

/// Result of an enqueue-type action.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReceipt {
    /// Target document.
    pub document_id: String,
    /// Queue job now responsible for the document.
    pub queue_job_id: Option<String>,
    /// A live job already existed; nothing new was enqueued.
    pub deduplicated: bool,
}

/// Operator actions: enqueue, retry, reprocess, delete.
pub struct Dispatcher {
    orchestrator: Arc<PipelineOrchestrator>,
    queue: Arc<dyn QueueTransport>,
    settings: QueueSettings,
}

impl Dispatcher {
    /// Dispatcher publishing to `settings.name`.
    pub fn new(
        orchestrator: Arc<PipelineOrchestrator>,
        queue: Arc<dyn QueueTransport>,
        settings: QueueSettings,
    ) -> Self {
        Self {
            orchestrator,
            queue,
            settings,
        }
    }

    /// Enqueue a document, creating its processing job on first use.
    pub async fn enqueue_document(&self, document_id: &str) -> Result<EnqueueReceipt, DispatchError> {
        let store = &self.orchestrator.components().store;
        let mut document = store.get_document(document_id).await?;
        let mut job = match store.get_job(document_id).await? {
            Some(job) => job,
            None => ProcessingJob::new(document_id, self.max_attempts()),
        };
        self.submit(&mut document, &mut job).await
    }

    /// Re-enqueue a failed document with a fresh queue job, keeping its stage map.
    pub async fn retry_document(&self, document_id: &str) -> Result<EnqueueReceipt, DispatchError> {
        let store = &self.orchestrator.components().store;
        let mut document = store.get_document(document_id).await?;
        let mut job = store
            .get_job(document_id)
            .await?
            .ok_or_else(|| StoreError::not_found("processing job", document_id))?;
        if job.status != JobStatus::Failed {
            return Err(DispatchError::InvalidState {
                document_id: document_id.to_string(),
                status: job.status,
                action: "retry",
            });
        }

        self.cancel_queue_job(&job).await?;
        job.attempts = 0;
        job.error = None;
        job.progress.last_error = None;
        document.processing_error = None;

        tracing::info!(document_id, progress = ?job.progress, "Retrying document");
        self.submit(&mut document, &mut job).await
    }

    /// Drop vectors and chunks, reset the stage map, and enqueue a full run.
    pub async fn reprocess_document(&self, document_id: &str) -> Result<EnqueueReceipt, DispatchError> {
        let store = &self.orchestrator.components().store;
        let mut document = store.get_document(document_id).await?;
        let mut job = match store.get_job(document_id).await? {
            Some(job) => job,
            None => ProcessingJob::new(document_id, self.max_attempts()),
        };
        if job.status == JobStatus::Processing {
            return Err(DispatchError::InvalidState {
                document_id: document_id.to_string(),
                status: job.status,
                action: "reprocess",
            });
        }

        self.cancel_queue_job(&job).await?;
        self.orchestrator.delete_vectors(&document).await?;

        job.progress = StageProgress::default();
        job.attempts = 0;
        job.error = None;
        job.current_step = PipelineStep::Queued;
        job.started_at = None;
        job.completed_at = None;
        store.replace_chunks(document_id, Vec::new(), &job).await?;

        document.extracted_text = None;
        document.word_count = None;
        document.total_chunks = None;
        document.embedding_model = None;
        document.processing_error = None;
        document.processed_at = None;

        tracing::info!(document_id, "Reprocessing document from scratch");
        self.submit(&mut document, &mut job).await
    }

    /// Cancel queued work and remove vectors, bytes, and records of a document.
    ///
    /// Refused while a consumer is running the document's job.
    pub async fn delete_document(&self, document_id: &str) -> Result<(), DispatchError> {
        let components = self.orchestrator.components();
        let document = components.store.get_document(document_id).await?;
        if let Some(job) = components.store.get_job(document_id).await? {
            if job.status == JobStatus::Processing {
                return Err(DispatchError::InvalidState {
                    document_id: document_id.to_string(),
                    status: job.status,
                    action: "delete",
                });
            }
            self.cancel_queue_job(&job).await?;
        }

        self.orchestrator.delete_vectors(&document).await?;
        components.blobs.delete(&document.storage_key).await?;
        components.store.delete_document(document_id).await?;

        tracing::info!(document_id, storage_key = %document.storage_key, "Document deleted");
        Ok(())
    }

    /// Depth counters of the processing queue.
    pub async fn stats(&self) -> Result<QueueStats, DispatchError> {
        Ok(self.queue.stats(&self.settings.name).await?)
    }

    async fn submit(
        &self,
        document: &mut Document,
        job: &mut ProcessingJob,
    ) -> Result<EnqueueReceipt, DispatchError> {
        let payload = DocumentJob {
            document_id: document.id.clone(),
            collection_id: document.collection_id.clone(),
        };
        let options = EnqueueOptions::for_document(&self.settings, &document.id);

        let Some(queue_job_id) = self
            .queue
            .enqueue(&self.settings.name, payload, options)
            .await?
        else {
            tracing::debug!(document_id = %document.id, "Document already has a live queue job");
            return Ok(EnqueueReceipt {
                document_id: document.id.clone(),
                queue_job_id: job.queue_job_id.clone(),
                deduplicated: true,
            });
        };

        job.queue_job_id = Some(queue_job_id.clone());
        job.status = JobStatus::Queued;
        job.max_attempts = self.max_attempts();
        job.completed_at = None;
        document.status = DocumentStatus::Pending;
        document.touch();
        self.orchestrator
            .components()
            .store
            .save_document_and_job(document, job)
            .await?;

        tracing::info!(
            document_id = %document.id,
            queue = %self.settings.name,
            queue_job_id = %queue_job_id,
            "Document enqueued"
        );
        Ok(EnqueueReceipt {
            document_id: document.id.clone(),
            queue_job_id: Some(queue_job_id),
            deduplicated: false,
        })
    }

    async fn cancel_queue_job(&self, job: &ProcessingJob) -> Result<(), DispatchError> {
        let Some(queue_job_id) = job.queue_job_id.as_deref() else {
            return Ok(());
        };
        match self.queue.cancel(queue_job_id).await {
            Ok(()) | Err(QueueError::NotFound(_)) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn max_attempts(&self) -> u32 {
        self.settings.retry_limit + 1
    }
}
