//! Relational store collaborator.
//!
//! The pipeline treats the store as the single source of truth for resumability. Writes that
//! pair a side effect with a checkpoint flag (`replace_chunks`, `assign_vector_ids`,
//! `save_document_and_job`) are atomic per call, so a crash can never leave chunk rows behind
//! without the flag that accounts for them, or the reverse.

mod memory;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::InMemoryStore;
pub use types::{
    Collection, Document, DocumentChunk, DocumentStatus, JobStatus, PipelineStep, ProcessingJob,
    StageProgress,
};

/// Errors raised by a [`RecordStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Record does not exist.
    #[error("{entity} '{id}' not found")]
    NotFound {
        /// Record kind.
        entity: &'static str,
        /// Requested identifier.
        id: String,
    },
    /// Write conflicts with existing state.
    #[error("Conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// CRUD over documents, collections, jobs, and chunks.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Load a document.
    async fn get_document(&self, id: &str) -> Result<Document, StoreError>;

    /// Insert or replace a document.
    async fn save_document(&self, document: &Document) -> Result<(), StoreError>;

    /// Load a collection.
    async fn get_collection(&self, id: &str) -> Result<Collection, StoreError>;

    /// Insert or replace a collection.
    async fn save_collection(&self, collection: &Collection) -> Result<(), StoreError>;

    /// Job for a document, if one was ever enqueued.
    async fn get_job(&self, document_id: &str) -> Result<Option<ProcessingJob>, StoreError>;

    /// Insert or replace the job for `job.document_id`; `NotFound` once the document is gone.
    async fn save_job(&self, job: &ProcessingJob) -> Result<(), StoreError>;

    /// Update an existing document and write its job together; never recreates a deleted document.
    async fn save_document_and_job(
        &self,
        document: &Document,
        job: &ProcessingJob,
    ) -> Result<(), StoreError>;

    /// Replace all chunk rows of a document and save `job` in the same write.
    async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
        job: &ProcessingJob,
    ) -> Result<(), StoreError>;

    /// Chunk rows ordered by `chunk_index`.
    async fn list_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, StoreError>;

    /// Record `(chunk_id, vector_id)` pairs and save `job` in the same write.
    async fn assign_vector_ids(
        &self,
        document_id: &str,
        assignments: &[(String, String)],
        job: &ProcessingJob,
    ) -> Result<(), StoreError>;

    /// Remove a document with its job and chunk rows.
    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError>;
}
