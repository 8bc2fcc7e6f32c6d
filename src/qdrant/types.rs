//! Shared types used by the Qdrant client and helpers.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with Qdrant.
#[derive(Debug, Error)]
pub enum QdrantError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid Qdrant URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Qdrant responded with an unexpected status code.
    #[error("Unexpected Qdrant response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned from Qdrant.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Every record handed to an upsert was invalid.
    #[error("No valid records to upsert into '{collection}'")]
    NoValidRecords {
        /// Target collection.
        collection: String,
    },
    /// Collection dimension cannot be derived from the embedding model.
    #[error("Unknown vector dimension for model '{0}'")]
    UnknownDimension(String),
}

impl QdrantError {
    /// Remote failures are transient; configuration problems are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::UnexpectedStatus { .. } | Self::NoValidRecords { .. } => true,
            Self::InvalidUrl(_) | Self::UnknownDimension(_) => false,
        }
    }
}

/// Payload stored alongside every chunk vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPayload {
    /// Application chunk identifier (reverse lookup for the surrogate point id).
    pub chunk_id: String,
    /// Owning document.
    pub document_id: String,
    /// Owning application collection.
    pub collection_id: String,
    /// Position of the chunk within its document.
    pub chunk_index: usize,
    /// Chunk text.
    pub content: String,
    /// Document display name.
    pub document_name: String,
    /// Inclusive start offset in characters.
    pub start_char: usize,
    /// Exclusive end offset in characters.
    pub end_char: usize,
    /// Page the chunk starts on, when the extractor reports pages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// SHA-256 of the chunk content.
    pub chunk_hash: String,
}

/// A chunk vector ready to be written.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Application chunk identifier; the point id is derived from it.
    pub chunk_id: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Payload written with the vector.
    pub payload: ChunkPayload,
}

/// Outcome of an upsert request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// `(chunk_id, point_id)` pairs written, in input order.
    pub written: Vec<(String, String)>,
    /// Records dropped by validation.
    pub skipped: usize,
}

/// Filters that can be applied to Qdrant search queries.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilterArgs {
    /// Exact match on the `collectionId` payload field.
    #[serde(default)]
    pub collection_id: Option<String>,
    /// Exact match on the `documentId` payload field.
    #[serde(default)]
    pub document_id: Option<String>,
}

/// Scored payload returned by Qdrant queries.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredPoint {
    /// Identifier assigned to the vector.
    pub id: String,
    /// Similarity score computed by Qdrant.
    pub score: f32,
    /// Optional payload associated with the vector.
    pub payload: Option<Map<String, Value>>,
}

/// Point returned by a scroll, without its vector.
#[derive(Debug, Clone)]
pub struct StoredPoint {
    /// Point identifier.
    pub id: String,
    /// Point payload.
    pub payload: Map<String, Value>,
}

impl StoredPoint {
    /// `chunkId` recorded in the payload.
    pub fn chunk_id(&self) -> Option<&str> {
        self.payload.get("chunkId").and_then(Value::as_str)
    }

    /// `chunkIndex` recorded in the payload.
    pub fn chunk_index(&self) -> Option<u64> {
        self.payload.get("chunkIndex").and_then(Value::as_u64)
    }
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) id: Option<Value>,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
