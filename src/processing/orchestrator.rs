//! Resumable document pipeline.
//!
//! A run walks four stages (extract, chunk, embed, index) and then finalizes. Each stage is
//! guarded by its flag in the job's [`StageProgress`]; a stage whose flag is already set is
//! skipped, so a redelivered job resumes where the previous attempt stopped. Every flag is
//! written in the same store call as the side effect it accounts for.
//!
//! Vectors are not persisted relationally. When a run resumes after stage 3 but before stage 4,
//! the stored chunk text is embedded again before indexing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use time::OffsetDateTime;

use crate::{
    blob::BlobStore,
    embedding::EmbeddingService,
    extraction::TextExtractor,
    metrics::PipelineMetrics,
    processing::{
        chunking::ChunkingService,
        sanitize::{clean_extracted_text, word_count},
        types::{ChunkingMode, PipelineError, PipelineOutcome, VerificationReport},
    },
    qdrant::{
        ChunkPayload, ScoredPoint, SearchFilterArgs, VectorIndex, VectorRecord,
        collection_name_for_model, compute_chunk_hash,
    },
    store::{
        Collection, Document, DocumentChunk, DocumentStatus, JobStatus, PipelineStep,
        ProcessingJob, RecordStore,
    },
};

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct PipelineComponents {
    /// Relational store holding documents, jobs, and chunks.
    pub store: Arc<dyn RecordStore>,
    /// Source of document bytes.
    pub blobs: Arc<dyn BlobStore>,
    /// Text extractor.
    pub extractor: Arc<dyn TextExtractor>,
    /// Embedding front-end.
    pub embeddings: EmbeddingService,
    /// Vector store.
    pub index: Arc<dyn VectorIndex>,
    /// Shared counters.
    pub metrics: Arc<PipelineMetrics>,
}

/// Static settings for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Prefix for vector-store collection names.
    pub collection_prefix: String,
    /// Identity stamped onto jobs this process runs.
    pub worker_id: Option<String>,
    /// Attempt ceiling for jobs created on the fly.
    pub max_attempts: u32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            collection_prefix: "documents".into(),
            worker_id: None,
            max_attempts: 4,
        }
    }
}

/// Drives one document at a time through the resumable pipeline.
pub struct PipelineOrchestrator {
    components: PipelineComponents,
    settings: OrchestratorSettings,
    chunkers: Mutex<HashMap<String, ChunkingService>>,
}

impl PipelineOrchestrator {
    /// Build an orchestrator over explicit collaborators.
    pub fn new(components: PipelineComponents, settings: OrchestratorSettings) -> Self {
        Self {
            components,
            settings,
            chunkers: Mutex::new(HashMap::new()),
        }
    }

    /// Shared collaborators.
    pub fn components(&self) -> &PipelineComponents {
        &self.components
    }

    /// Vector-store collection used for `model`.
    pub fn vector_collection(&self, model: &str) -> String {
        collection_name_for_model(&self.settings.collection_prefix, model)
    }

    /// Run (or resume) the pipeline for `document_id`.
    ///
    /// On failure the document and job are marked `FAILED`, the attempt counter is bumped, and
    /// the error is stored as `lastError` while earlier stage flags are kept. The error is then
    /// returned so the queue transport can decide on redelivery.
    pub async fn process_document(
        &self,
        document_id: &str,
        queue_job_id: Option<&str>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let store = &self.components.store;
        let mut document = store.get_document(document_id).await?;
        let mut job = match store.get_job(document_id).await? {
            Some(job) => job,
            None => ProcessingJob::new(document_id, self.settings.max_attempts),
        };

        let now = OffsetDateTime::now_utc();
        document.status = DocumentStatus::Processing;
        document.processing_error = None;
        document.touch();
        job.status = JobStatus::Processing;
        if let Some(queue_job_id) = queue_job_id {
            job.queue_job_id = Some(queue_job_id.to_string());
        }
        job.worker_id = self.settings.worker_id.clone();
        job.started_at = Some(now);
        job.completed_at = None;
        store.save_document_and_job(&document, &job).await?;

        tracing::info!(
            document_id,
            attempt = job.attempts + 1,
            progress = ?job.progress,
            "Processing document"
        );

        match self.run_stages(&mut document, &mut job).await {
            Ok(outcome) => Ok(outcome),
            Err(error) => {
                self.record_failure(&mut document, &mut job, &error).await;
                Err(error)
            }
        }
    }

    /// Compare a document's chunk rows against the vectors stored for it.
    pub async fn verify_document(
        &self,
        document_id: &str,
    ) -> Result<VerificationReport, PipelineError> {
        let store = &self.components.store;
        let document = store.get_document(document_id).await?;
        let model = match document.embedding_model.clone() {
            Some(model) => model,
            None => store.get_collection(&document.collection_id).await?.embedding_model,
        };
        let name = self.vector_collection(&model);

        let chunks = store.list_chunks(document_id).await?;
        let points = self
            .components
            .index
            .document_points(&name, document_id)
            .await?;

        let by_id: HashMap<&str, &DocumentChunk> =
            chunks.iter().map(|chunk| (chunk.id.as_str(), chunk)).collect();
        let mut seen = HashSet::new();
        let mut report = VerificationReport {
            document_id: document_id.to_string(),
            chunk_rows: chunks.len(),
            vectors: points.len(),
            ..Default::default()
        };

        for point in &points {
            let Some(chunk) = point.chunk_id().and_then(|id| by_id.get(id)) else {
                report.orphaned_vectors.push(point.id.clone());
                continue;
            };
            if !seen.insert(chunk.id.as_str()) {
                report.orphaned_vectors.push(point.id.clone());
                continue;
            }
            if point.chunk_index() != Some(chunk.chunk_index as u64) {
                report.index_mismatches.push(chunk.id.clone());
            }
        }
        report.missing_vectors = chunks
            .iter()
            .filter(|chunk| !seen.contains(chunk.id.as_str()))
            .map(|chunk| chunk.id.clone())
            .collect();

        tracing::info!(
            document_id,
            chunks = report.chunk_rows,
            vectors = report.vectors,
            consistent = report.is_consistent(),
            "Verified document vectors"
        );
        Ok(report)
    }

    /// Delete every vector stored for a document.
    pub async fn delete_vectors(&self, document: &Document) -> Result<(), PipelineError> {
        let model = match document.embedding_model.clone() {
            Some(model) => model,
            None => {
                self.components
                    .store
                    .get_collection(&document.collection_id)
                    .await?
                    .embedding_model
            }
        };
        let name = self.vector_collection(&model);
        self.components
            .index
            .delete_by_document(&name, &document.id)
            .await?;
        tracing::info!(document_id = %document.id, collection = %name, "Deleted document vectors");
        Ok(())
    }

    /// Semantic search within one application collection, optionally narrowed to a document.
    pub async fn search(
        &self,
        collection_id: &str,
        query: &str,
        limit: usize,
        document_id: Option<String>,
    ) -> Result<Vec<ScoredPoint>, PipelineError> {
        let collection = self.components.store.get_collection(collection_id).await?;
        let vector = self
            .components
            .embeddings
            .embed_query(query, &collection.embedding_model)
            .await?;
        let filter = SearchFilterArgs {
            collection_id: Some(collection.id.clone()),
            document_id,
        };
        let hits = self
            .components
            .index
            .search(
                &self.vector_collection(&collection.embedding_model),
                vector,
                limit.max(1),
                &filter,
            )
            .await?;
        Ok(hits)
    }

    async fn run_stages(
        &self,
        document: &mut Document,
        job: &mut ProcessingJob,
    ) -> Result<PipelineOutcome, PipelineError> {
        let collection = self
            .components
            .store
            .get_collection(&document.collection_id)
            .await?;
        let model = collection.embedding_model.clone();
        let mut stages_run = Vec::new();

        if job.progress.text_extracted {
            tracing::debug!(document_id = %document.id, stage = "extract", "Stage already complete");
        } else {
            self.extract(document, job).await?;
            stages_run.push("extract".to_string());
        }

        let chunks = if job.progress.chunks_created {
            tracing::debug!(document_id = %document.id, stage = "chunk", "Stage already complete; loading chunks");
            self.components.store.list_chunks(&document.id).await?
        } else {
            let chunks = self.chunk(document, job, &collection).await?;
            stages_run.push("chunk".to_string());
            chunks
        };

        let mut vectors = None;
        if job.progress.embeddings_generated {
            tracing::debug!(document_id = %document.id, stage = "embed", "Stage already complete");
        } else {
            job.current_step = PipelineStep::Embedding;
            let generated = self.embed(&document.id, &chunks, &model).await?;
            job.progress.embeddings_generated = true;
            job.current_step = PipelineStep::Indexing;
            self.components.store.save_job(job).await?;
            vectors = Some(generated);
            stages_run.push("embed".to_string());
        }

        if job.progress.vectors_stored {
            tracing::debug!(document_id = %document.id, stage = "index", "Stage already complete");
        } else {
            let chunks = self.components.store.list_chunks(&document.id).await?;
            let vectors = match vectors.take() {
                Some(vectors) => vectors,
                None => {
                    tracing::info!(
                        document_id = %document.id,
                        chunks = chunks.len(),
                        "Regenerating embeddings before indexing"
                    );
                    self.components.metrics.record_regenerated();
                    self.embed(&document.id, &chunks, &model).await?
                }
            };
            self.index(document, job, &collection, &chunks, vectors)
                .await?;
            stages_run.push("index".to_string());
        }

        let chunk_count = chunks.len();
        let now = OffsetDateTime::now_utc();
        document.status = DocumentStatus::Completed;
        document.embedding_model = Some(model.clone());
        document.total_chunks = Some(chunk_count);
        document.processed_at = Some(now);
        document.processing_error = None;
        document.touch();
        job.status = JobStatus::Completed;
        job.current_step = PipelineStep::Completed;
        job.completed_at = Some(now);
        job.error = None;
        job.progress.last_error = None;
        self.components
            .store
            .save_document_and_job(document, job)
            .await?;
        self.components.metrics.record_completed(chunk_count as u64);

        tracing::info!(
            document_id = %document.id,
            chunks = chunk_count,
            model = %model,
            stages = ?stages_run,
            "Document processed"
        );

        Ok(PipelineOutcome {
            document_id: document.id.clone(),
            chunk_count,
            embedding_model: model,
            stages_run,
        })
    }

    async fn extract(
        &self,
        document: &mut Document,
        job: &mut ProcessingJob,
    ) -> Result<(), PipelineError> {
        job.current_step = PipelineStep::Extracting;
        tracing::info!(document_id = %document.id, stage = "extract", "Extracting text");

        let bytes = self
            .components
            .blobs
            .download(&document.storage_key)
            .await?;
        let extracted = self
            .components
            .extractor
            .extract(&bytes, &document.mime_type)
            .await?;
        let cleaned = clean_extracted_text(&extracted.text);
        if cleaned.is_empty() {
            return Err(PipelineError::ExtractionFailed {
                document_id: document.id.clone(),
            });
        }

        document.word_count = Some(word_count(&cleaned) as u64);
        document.extracted_text = Some(cleaned);
        document.page_count = extracted.metadata.page_count;
        document.title = extracted.metadata.title.or(document.title.take());
        document.author = extracted.metadata.author.or(document.author.take());
        document.is_scanned = extracted.is_scanned;
        document.touch();

        job.progress.text_extracted = true;
        job.current_step = PipelineStep::Chunking;
        self.components
            .store
            .save_document_and_job(document, job)
            .await?;
        Ok(())
    }

    async fn chunk(
        &self,
        document: &Document,
        job: &mut ProcessingJob,
        collection: &Collection,
    ) -> Result<Vec<DocumentChunk>, PipelineError> {
        job.current_step = PipelineStep::Chunking;
        let text = document
            .extracted_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| PipelineError::ExtractionFailed {
                document_id: document.id.clone(),
            })?;

        let overlap = match collection.chunking_mode {
            ChunkingMode::Words => 0,
            ChunkingMode::Characters | ChunkingMode::Sections => collection.chunk_overlap,
        };
        let records = self
            .chunker_for(&collection.embedding_model)
            .chunk_with_mode(collection.chunking_mode, text, collection.chunk_size, overlap)?;

        let chunks: Vec<DocumentChunk> = records
            .into_iter()
            .map(|record| DocumentChunk {
                id: uuid::Uuid::new_v4().to_string(),
                document_id: document.id.clone(),
                chunk_index: record.index,
                content: record.content,
                start_char: record.start_char,
                end_char: record.end_char,
                token_count: record.token_count,
                vector_id: None,
            })
            .collect();

        job.progress.chunks_created = true;
        job.current_step = PipelineStep::Embedding;
        self.components
            .store
            .replace_chunks(&document.id, chunks.clone(), job)
            .await?;

        tracing::info!(
            document_id = %document.id,
            stage = "chunk",
            mode = ?collection.chunking_mode,
            size = collection.chunk_size,
            overlap,
            chunks = chunks.len(),
            "Chunks created"
        );
        Ok(chunks)
    }

    async fn embed(
        &self,
        document_id: &str,
        chunks: &[DocumentChunk],
        model: &str,
    ) -> Result<Vec<Vec<f32>>, PipelineError> {
        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = &self.components.embeddings;
        let result = embeddings
            .embed_batch(&texts, model, embeddings.batch_size())
            .await?;
        if result.vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingCountMismatch {
                chunks: chunks.len(),
                vectors: result.vectors.len(),
            });
        }

        self.components
            .metrics
            .record_tokens(result.usage.total_tokens);
        tracing::info!(
            document_id,
            stage = "embed",
            model,
            vectors = result.vectors.len(),
            tokens = result.usage.total_tokens,
            "Embeddings generated"
        );
        Ok(result.vectors)
    }

    async fn index(
        &self,
        document: &Document,
        job: &mut ProcessingJob,
        collection: &Collection,
        chunks: &[DocumentChunk],
        vectors: Vec<Vec<f32>>,
    ) -> Result<(), PipelineError> {
        job.current_step = PipelineStep::Indexing;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingCountMismatch {
                chunks: chunks.len(),
                vectors: vectors.len(),
            });
        }

        let model = &collection.embedding_model;
        let name = self.vector_collection(model);
        let index = &self.components.index;
        index.ensure_collection(&name, model).await?;

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorRecord {
                chunk_id: chunk.id.clone(),
                vector,
                payload: ChunkPayload {
                    chunk_id: chunk.id.clone(),
                    document_id: document.id.clone(),
                    collection_id: collection.id.clone(),
                    chunk_index: chunk.chunk_index,
                    content: chunk.content.clone(),
                    document_name: document.name.clone(),
                    start_char: chunk.start_char,
                    end_char: chunk.end_char,
                    page_number: None,
                    chunk_hash: compute_chunk_hash(&chunk.content),
                },
            })
            .collect();

        let summary = index.upsert(&name, records, model).await?;
        if summary.written.len() != chunks.len() {
            return Err(PipelineError::IncompleteIndex {
                expected: chunks.len(),
                written: summary.written.len(),
            });
        }

        job.progress.vectors_stored = true;
        job.current_step = PipelineStep::Finalizing;
        self.components
            .store
            .assign_vector_ids(&document.id, &summary.written, job)
            .await?;

        tracing::info!(
            document_id = %document.id,
            stage = "index",
            collection = %name,
            vectors = summary.written.len(),
            "Vectors stored"
        );
        Ok(())
    }

    async fn record_failure(
        &self,
        document: &mut Document,
        job: &mut ProcessingJob,
        error: &PipelineError,
    ) {
        let message = error.to_string();
        document.status = DocumentStatus::Failed;
        document.processing_error = Some(message.clone());
        document.touch();
        job.status = JobStatus::Failed;
        job.attempts += 1;
        job.error = Some(message.clone());
        job.progress.last_error = Some(message);

        self.components.metrics.record_failed();
        tracing::error!(
            document_id = %document.id,
            step = %job.current_step,
            attempts = job.attempts,
            retryable = error.is_retryable(),
            error = %error,
            "Document processing failed"
        );

        if let Err(store_error) = self
            .components
            .store
            .save_document_and_job(document, job)
            .await
        {
            tracing::error!(
                document_id = %document.id,
                error = %store_error,
                "Failed to record processing failure"
            );
        }
    }

    fn chunker_for(&self, model: &str) -> ChunkingService {
        let mut chunkers = match self.chunkers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        chunkers
            .entry(model.to_string())
            .or_insert_with(|| ChunkingService::for_model(model))
            .clone()
    }
}
