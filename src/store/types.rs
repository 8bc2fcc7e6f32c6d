//! Relational records owned by the pipeline.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::processing::types::ChunkingMode;

/// Document lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Uploaded, not yet picked up.
    #[default]
    Pending,
    /// A worker is running the pipeline.
    Processing,
    /// Every stage finished.
    Completed,
    /// The last attempt failed; see `processing_error`.
    Failed,
}

/// Processing job lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting in the queue.
    #[default]
    Queued,
    /// Claimed by a worker.
    Processing,
    /// Finished successfully.
    Completed,
    /// Last attempt failed.
    Failed,
}

/// Label of the stage a job is in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Not started.
    #[default]
    Queued,
    /// Downloading and extracting text.
    Extracting,
    /// Splitting text into chunks.
    Chunking,
    /// Generating embeddings.
    Embedding,
    /// Writing vectors.
    Indexing,
    /// Stamping completion.
    Finalizing,
    /// Done.
    Completed,
}

impl PipelineStep {
    /// Stable lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexing => "indexing",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
        }
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Crash-recovery checkpoint: one flag per stage plus the last failure message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageProgress {
    /// Stage 1 persisted extracted text.
    #[serde(default)]
    pub text_extracted: bool,
    /// Stage 2 persisted chunk rows.
    #[serde(default)]
    pub chunks_created: bool,
    /// Stage 3 generated embeddings.
    #[serde(default)]
    pub embeddings_generated: bool,
    /// Stage 4 wrote vectors and their ids.
    #[serde(default)]
    pub vectors_stored: bool,
    /// Message of the most recent failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl StageProgress {
    /// All four stages are done.
    pub fn is_complete(&self) -> bool {
        self.text_extracted && self.chunks_created && self.embeddings_generated && self.vectors_stored
    }
}

/// Uploaded document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Identifier.
    pub id: String,
    /// Owning collection.
    pub collection_id: String,
    /// Display name (usually the file name).
    pub name: String,
    /// Blob store key.
    pub storage_key: String,
    /// MIME type supplied at upload.
    pub mime_type: String,
    /// Size of the stored bytes.
    pub byte_size: u64,
    /// Lifecycle status.
    pub status: DocumentStatus,
    /// Cleaned text, set by stage 1.
    pub extracted_text: Option<String>,
    /// Page count reported by the extractor.
    pub page_count: Option<u32>,
    /// Word count of the cleaned text.
    pub word_count: Option<u64>,
    /// Title reported by the extractor.
    pub title: Option<String>,
    /// Author reported by the extractor.
    pub author: Option<String>,
    /// Extractor flagged the document as a scan.
    pub is_scanned: bool,
    /// Number of chunks at completion.
    pub total_chunks: Option<usize>,
    /// Embedding model stamped at completion.
    pub embedding_model: Option<String>,
    /// Message of the last failure.
    pub processing_error: Option<String>,
    /// Completion time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub processed_at: Option<OffsetDateTime>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Last mutation time.
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Document {
    /// A freshly uploaded, pending document.
    pub fn new(
        id: impl Into<String>,
        collection_id: impl Into<String>,
        name: impl Into<String>,
        storage_key: impl Into<String>,
        mime_type: impl Into<String>,
        byte_size: u64,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            collection_id: collection_id.into(),
            name: name.into(),
            storage_key: storage_key.into(),
            mime_type: mime_type.into(),
            byte_size,
            status: DocumentStatus::Pending,
            extracted_text: None,
            page_count: None,
            word_count: None,
            title: None,
            author: None,
            is_scanned: false,
            total_chunks: None,
            embedding_model: None,
            processing_error: None,
            processed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Document collection and its pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Embedding model used for every document in the collection.
    pub embedding_model: String,
    /// Chunk size in the unit of `chunking_mode`.
    pub chunk_size: usize,
    /// Chunk overlap in the unit of `chunking_mode`.
    pub chunk_overlap: usize,
    /// Chunking strategy.
    #[serde(default)]
    pub chunking_mode: ChunkingMode,
}

/// Persisted chunk row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    /// Chunk identifier.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Zero-based position, contiguous per document.
    pub chunk_index: usize,
    /// Chunk text.
    pub content: String,
    /// Inclusive start offset in characters.
    pub start_char: usize,
    /// Exclusive end offset in characters.
    pub end_char: usize,
    /// Advisory token estimate.
    pub token_count: usize,
    /// Vector store point id, set by stage 4.
    pub vector_id: Option<String>,
}

/// Queue-facing record tracking one document's processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingJob {
    /// Identifier.
    pub id: String,
    /// Document being processed (one job per document).
    pub document_id: String,
    /// Queue transport job id of the current delivery.
    pub queue_job_id: Option<String>,
    /// Worker that last claimed the job.
    pub worker_id: Option<String>,
    /// Lifecycle status.
    pub status: JobStatus,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Attempt ceiling.
    pub max_attempts: u32,
    /// Stage currently running.
    pub current_step: PipelineStep,
    /// Stage completion checkpoint.
    pub progress: StageProgress,
    /// Message of the last failure.
    pub error: Option<String>,
    /// Start of the current attempt.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Completion time.
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl ProcessingJob {
    /// A queued job with an empty checkpoint.
    pub fn new(document_id: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            document_id: document_id.into(),
            queue_job_id: None,
            worker_id: None,
            status: JobStatus::Queued,
            attempts: 0,
            max_attempts,
            current_step: PipelineStep::Queued,
            progress: StageProgress::default(),
            error: None,
            started_at: None,
            completed_at: None,
        }
    }
}
