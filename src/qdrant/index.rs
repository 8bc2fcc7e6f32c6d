use async_trait::async_trait;
use futures_util::TryStreamExt;

use super::client::QdrantService;
use super::scroller::stream_document_points;
use super::types::{
    QdrantError, ScoredPoint, SearchFilterArgs, StoredPoint, UpsertSummary, VectorRecord,
};

/// Vector store operations the pipeline depends on.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Idempotently create the collection for `model`.
    async fn ensure_collection(&self, name: &str, model: &str) -> Result<(), QdrantError>;

    /// Batch write records, overwriting points that share a chunk id.
    async fn upsert(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        model: &str,
    ) -> Result<UpsertSummary, QdrantError>;

    /// Remove all points that belong to `document_id`.
    async fn delete_by_document(&self, name: &str, document_id: &str) -> Result<(), QdrantError>;

    /// Scored search, best match first.
    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &SearchFilterArgs,
    ) -> Result<Vec<ScoredPoint>, QdrantError>;

    /// Every point stored for `document_id`.
    async fn document_points(
        &self,
        name: &str,
        document_id: &str,
    ) -> Result<Vec<StoredPoint>, QdrantError>;
}

#[async_trait]
impl VectorIndex for QdrantService {
    async fn ensure_collection(&self, name: &str, model: &str) -> Result<(), QdrantError> {
        QdrantService::ensure_collection(self, name, model).await
    }

    async fn upsert(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        model: &str,
    ) -> Result<UpsertSummary, QdrantError> {
        QdrantService::upsert(self, name, records, model).await
    }

    async fn delete_by_document(&self, name: &str, document_id: &str) -> Result<(), QdrantError> {
        QdrantService::delete_by_document(self, name, document_id).await
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &SearchFilterArgs,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        QdrantService::search(self, name, vector, limit, filter).await
    }

    async fn document_points(
        &self,
        name: &str,
        document_id: &str,
    ) -> Result<Vec<StoredPoint>, QdrantError> {
        stream_document_points(self, name, document_id)
            .try_collect()
            .await
    }
}
