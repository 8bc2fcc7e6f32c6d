//! Qdrant vector store integration.

pub mod client;
pub mod filters;
mod index;
pub mod payload;
/// Streaming helpers for Qdrant scroll pagination.
pub mod scroller;
pub mod types;

pub use client::QdrantService;
pub use filters::{build_search_filter, document_filter};
pub use index::VectorIndex;
pub use payload::{collection_name_for_model, compute_chunk_hash, point_id_for_chunk};
pub use types::{
    ChunkPayload, QdrantError, ScoredPoint, SearchFilterArgs, StoredPoint, UpsertSummary,
    VectorRecord,
};
