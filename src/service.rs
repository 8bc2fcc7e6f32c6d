//! Operator-facing service shared by the HTTP surface and the CLI.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::{
    metrics::MetricsSnapshot,
    processing::{PipelineError, PipelineOrchestrator, VerificationReport},
    qdrant::ScoredPoint,
    queue::{DispatchError, Dispatcher, EnqueueReceipt, QueueStats},
    store::{DocumentStatus, ProcessingJob},
};

const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 100;

/// Errors surfaced to operators.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Queue-facing action failed.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    /// Pipeline read failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// Request was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ServiceError {
    /// Target record does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Dispatch(error) => error.is_not_found(),
            Self::Pipeline(error) => matches!(error, PipelineError::NotFound(_)),
            Self::InvalidRequest(_) => false,
        }
    }

    /// Action conflicts with the job's current state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Dispatch(DispatchError::InvalidState { .. }))
    }
}

/// Document status as reported to operators; extracted text is omitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentView {
    /// Identifier.
    pub id: String,
    /// Owning collection.
    pub collection_id: String,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: DocumentStatus,
    /// Chunk count at completion.
    pub total_chunks: Option<usize>,
    /// Model stamped at completion.
    pub embedding_model: Option<String>,
    /// Last failure message.
    pub processing_error: Option<String>,
    /// Completion time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    /// Processing job, when one was created.
    pub job: Option<ProcessingJob>,
}

/// Semantic search request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Application collection to search.
    pub collection_id: String,
    /// Natural-language query.
    pub query: String,
    /// Maximum hits (default 10, capped at 100).
    #[serde(default)]
    pub limit: Option<usize>,
    /// Restrict hits to one document.
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Operations exposed to operators.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Enqueue a document for processing.
    async fn enqueue(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError>;

    /// Re-enqueue a failed document, resuming from its stage map.
    async fn retry(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError>;

    /// Discard derived data and process the document from scratch.
    async fn reprocess(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError>;

    /// Delete a document with its vectors, bytes, and records.
    async fn delete(&self, document_id: &str) -> Result<(), ServiceError>;

    /// Status of a document and its job.
    async fn document(&self, document_id: &str) -> Result<DocumentView, ServiceError>;

    /// Compare chunk rows with stored vectors.
    async fn verify(&self, document_id: &str) -> Result<VerificationReport, ServiceError>;

    /// Queue depth counters.
    async fn queue_stats(&self) -> Result<QueueStats, ServiceError>;

    /// Pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Semantic search over indexed chunks.
    async fn search(&self, request: SearchRequest) -> Result<Vec<ScoredPoint>, ServiceError>;
}

/// [`IngestApi`] backed by the orchestrator and dispatcher.
pub struct IngestService {
    orchestrator: Arc<PipelineOrchestrator>,
    dispatcher: Arc<Dispatcher>,
}

impl IngestService {
    /// Wrap shared pipeline handles.
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            orchestrator,
            dispatcher,
        }
    }
}

#[async_trait]
impl IngestApi for IngestService {
    async fn enqueue(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
        Ok(self.dispatcher.enqueue_document(document_id).await?)
    }

    async fn retry(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
        Ok(self.dispatcher.retry_document(document_id).await?)
    }

    async fn reprocess(&self, document_id: &str) -> Result<EnqueueReceipt, ServiceError> {
        Ok(self.dispatcher.reprocess_document(document_id).await?)
    }

    async fn delete(&self, document_id: &str) -> Result<(), ServiceError> {
        Ok(self.dispatcher.delete_document(document_id).await?)
    }

    async fn document(&self, document_id: &str) -> Result<DocumentView, ServiceError> {
        let store = &self.orchestrator.components().store;
        let document = store
            .get_document(document_id)
            .await
            .map_err(PipelineError::from)?;
        let job = store
            .get_job(document_id)
            .await
            .map_err(PipelineError::from)?;
        Ok(DocumentView {
            id: document.id,
            collection_id: document.collection_id,
            name: document.name,
            status: document.status,
            total_chunks: document.total_chunks,
            embedding_model: document.embedding_model,
            processing_error: document.processing_error,
            processed_at: document.processed_at,
            job,
        })
    }

    async fn verify(&self, document_id: &str) -> Result<VerificationReport, ServiceError> {
        Ok(self.orchestrator.verify_document(document_id).await?)
    }

    async fn queue_stats(&self) -> Result<QueueStats, ServiceError> {
        Ok(self.dispatcher.stats().await?)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.orchestrator.components().metrics.snapshot()
    }

    async fn search(&self, request: SearchRequest) -> Result<Vec<ScoredPoint>, ServiceError> {
        if request.query.trim().is_empty() {
            return Err(ServiceError::InvalidRequest("query must not be empty".into()));
        }
        let limit = request
            .limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);
        let hits = self
            .orchestrator
            .search(
                &request.collection_id,
                request.query.trim(),
                limit,
                request.document_id,
            )
            .await?;
        tracing::debug!(
            collection_id = %request.collection_id,
            limit,
            hits = hits.len(),
            "Search completed"
        );
        Ok(hits)
    }
}
