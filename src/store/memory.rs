use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::types::{Collection, Document, DocumentChunk, ProcessingJob};
use super::{RecordStore, StoreError};

#[derive(Default)]
struct State {
    documents: HashMap<String, Document>,
    collections: HashMap<String, Collection>,
    jobs: HashMap<String, ProcessingJob>,
    chunks: HashMap<String, Vec<DocumentChunk>>,
}

/// Process-local [`RecordStore`]; every call holds one lock, which makes each call atomic.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn get_document(&self, id: &str) -> Result<Document, StoreError> {
        let state = self.state.lock().await;
        state
            .documents
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("document", id))
    }

    async fn save_document(&self, document: &Document) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .documents
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn get_collection(&self, id: &str) -> Result<Collection, StoreError> {
        let state = self.state.lock().await;
        state
            .collections
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("collection", id))
    }

    async fn save_collection(&self, collection: &Collection) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state
            .collections
            .insert(collection.id.clone(), collection.clone());
        Ok(())
    }

    async fn get_job(&self, document_id: &str) -> Result<Option<ProcessingJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(document_id).cloned())
    }

    async fn save_job(&self, job: &ProcessingJob) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if !state.documents.contains_key(&job.document_id) {
            return Err(StoreError::not_found("document", &job.document_id));
        }
        state.jobs.insert(job.document_id.clone(), job.clone());
        Ok(())
    }

    async fn save_document_and_job(
        &self,
        document: &Document,
        job: &ProcessingJob,
    ) -> Result<(), StoreError> {
        if document.id != job.document_id {
            return Err(StoreError::Conflict(format!(
                "job {} belongs to document {}, not {}",
                job.id, job.document_id, document.id
            )));
        }
        let mut state = self.state.lock().await;
        let Some(stored) = state.documents.get_mut(&document.id) else {
            return Err(StoreError::not_found("document", &document.id));
        };
        *stored = document.clone();
        state.jobs.insert(job.document_id.clone(), job.clone());
        Ok(())
    }

    async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: Vec<DocumentChunk>,
        job: &ProcessingJob,
    ) -> Result<(), StoreError> {
        if let Some(stray) = chunks.iter().find(|chunk| chunk.document_id != document_id) {
            return Err(StoreError::Conflict(format!(
                "chunk {} belongs to document {}",
                stray.id, stray.document_id
            )));
        }
        let mut state = self.state.lock().await;
        if !state.documents.contains_key(document_id) {
            return Err(StoreError::not_found("document", document_id));
        }
        let mut chunks = chunks;
        chunks.sort_by_key(|chunk| chunk.chunk_index);
        state.chunks.insert(document_id.to_string(), chunks);
        state.jobs.insert(job.document_id.clone(), job.clone());
        Ok(())
    }

    async fn list_chunks(&self, document_id: &str) -> Result<Vec<DocumentChunk>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.chunks.get(document_id).cloned().unwrap_or_default())
    }

    async fn assign_vector_ids(
        &self,
        document_id: &str,
        assignments: &[(String, String)],
        job: &ProcessingJob,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let chunks = state
            .chunks
            .get_mut(document_id)
            .ok_or_else(|| StoreError::not_found("chunks for document", document_id))?;

        let by_id: HashMap<&str, &str> = assignments
            .iter()
            .map(|(chunk_id, vector_id)| (chunk_id.as_str(), vector_id.as_str()))
            .collect();
        for chunk in chunks.iter_mut() {
            if let Some(vector_id) = by_id.get(chunk.id.as_str()) {
                chunk.vector_id = Some((*vector_id).to_string());
            }
        }
        state.jobs.insert(job.document_id.clone(), job.clone());
        Ok(())
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state.documents.remove(document_id).is_none() {
            return Err(StoreError::not_found("document", document_id));
        }
        state.jobs.remove(document_id);
        state.chunks.remove(document_id);
        Ok(())
    }
}
