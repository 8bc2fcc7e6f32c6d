//! Core data types and error definitions for the processing pipeline.

use crate::{
    blob::BlobError,
    embedding::EmbeddingError,
    extraction::ExtractionError,
    qdrant::QdrantError,
    store::StoreError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while turning raw text into chunks.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// Ingestion configured an impossible window size.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Overlap would keep the window from advancing.
    #[error("chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    InvalidOverlap {
        /// Requested window size.
        size: usize,
        /// Requested overlap.
        overlap: usize,
    },
}

/// Strategy used to split extracted text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingMode {
    /// Fixed word windows; sizes are expressed in words.
    #[default]
    Words,
    /// Character windows snapped to sentence boundaries; sizes are expressed in characters.
    Characters,
    /// Paragraph packing bounded by a character budget.
    Sections,
}

impl std::str::FromStr for ChunkingMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "words" | "tokens" => Ok(Self::Words),
            "characters" | "chars" => Ok(Self::Characters),
            "sections" | "paragraphs" => Ok(Self::Sections),
            other => Err(format!("unknown chunking mode '{other}'")),
        }
    }
}

/// One chunk emitted by the chunking service.
///
/// `start_char`/`end_char` are character (not byte) offsets into the text that was chunked,
/// forming the half-open range `[start_char, end_char)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkRecord {
    /// Zero-based, contiguous position of the chunk within the document.
    pub index: usize,
    /// Trimmed chunk text.
    pub content: String,
    /// Inclusive start offset in characters.
    pub start_char: usize,
    /// Exclusive end offset in characters.
    pub end_char: usize,
    /// Advisory token estimate; billing uses provider-reported usage instead.
    pub token_count: usize,
}

/// Errors emitted by the document processing pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document, job, or collection record is missing.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Extractor returned no usable text.
    #[error("Text extraction produced no usable text for document {document_id}")]
    ExtractionFailed {
        /// Document whose extraction came back empty.
        document_id: String,
    },
    /// Extractor rejected or failed on the document bytes.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// Blob store failed to return the document bytes.
    #[error("Failed to download document: {0}")]
    Blob(#[from] BlobError),
    /// Chunking step failed to segment the document.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed to produce vectors for the input text.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Embeddings could not be zipped back onto chunks positionally.
    #[error("Embedding count mismatch: {chunks} chunks but {vectors} vectors")]
    EmbeddingCountMismatch {
        /// Chunks loaded for the document.
        chunks: usize,
        /// Vectors returned for those chunks.
        vectors: usize,
    },
    /// Vector store accepted fewer records than there are chunks.
    #[error("Indexed {written} of {expected} chunks")]
    IncompleteIndex {
        /// Chunks that should have been written.
        expected: usize,
        /// Records the vector store accepted.
        written: usize,
    },
    /// Qdrant interaction failed during indexing.
    #[error("Vector store request failed: {0}")]
    Index(#[from] QdrantError),
    /// Relational store rejected a read or write.
    #[error("Record store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => Self::NotFound(error.to_string()),
            other => Self::Store(other),
        }
    }
}

impl PipelineError {
    /// Whether the queue transport should redeliver the work item after this failure.
    ///
    /// Caller bugs (invalid chunking configuration, local embedding validation) and missing
    /// records are fatal; remote failures and empty extractions are retried up to the ceiling.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotFound(_) | Self::Chunking(_) => false,
            Self::Embedding(error) => error.is_retryable(),
            Self::Index(error) => error.is_retryable(),
            Self::Extraction(error) => error.is_retryable(),
            Self::ExtractionFailed { .. }
            | Self::Blob(_)
            | Self::EmbeddingCountMismatch { .. }
            | Self::IncompleteIndex { .. }
            | Self::Store(_) => true,
        }
    }
}

/// Summary of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// Document that reached `COMPLETED`.
    pub document_id: String,
    /// Number of chunks stored for the document.
    pub chunk_count: usize,
    /// Embedding model stamped onto the document.
    pub embedding_model: String,
    /// Stages executed in this run (skipped stages are omitted).
    pub stages_run: Vec<String>,
}

/// Result of comparing a document's chunk rows against its stored vectors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationReport {
    /// Document that was checked.
    pub document_id: String,
    /// Chunk rows present in the record store.
    pub chunk_rows: usize,
    /// Vectors found for the document in the vector store.
    pub vectors: usize,
    /// Chunk ids without a matching vector.
    pub missing_vectors: Vec<String>,
    /// Chunk ids whose vector payload carries a different `chunkIndex`.
    pub index_mismatches: Vec<String>,
    /// Vector point ids not backed by any chunk row.
    pub orphaned_vectors: Vec<String>,
}

impl VerificationReport {
    /// True when every chunk has exactly one agreeing vector and nothing is orphaned.
    pub fn is_consistent(&self) -> bool {
        self.chunk_rows == self.vectors
            && self.missing_vectors.is_empty()
            && self.index_mismatches.is_empty()
            && self.orphaned_vectors.is_empty()
    }
}
