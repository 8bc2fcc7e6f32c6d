#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use docuralis_ingest::{
    blob::{BlobError, BlobStore},
    config::QueueSettings,
    embedding::{
        EmbeddingProvider, EmbeddingService, EmbeddingUsage, ProviderError, ProviderResponse,
        cosine_similarity,
    },
    extraction::{ExtractedText, ExtractionError, PlainTextExtractor, TextExtractor},
    metrics::PipelineMetrics,
    processing::{ChunkingMode, OrchestratorSettings, PipelineComponents, PipelineOrchestrator},
    qdrant::{
        QdrantError, ScoredPoint, SearchFilterArgs, StoredPoint, UpsertSummary, VectorIndex,
        VectorRecord, point_id_for_chunk,
    },
    queue::{Dispatcher, InMemoryQueue, QueueConsumer},
    store::{Collection, Document, InMemoryStore, RecordStore},
};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

pub const MODEL: &str = "text-embedding-3-small";
pub const COLLECTION_ID: &str = "col-1";
const DIMENSION: usize = 16;

/// Deterministic provider: a byte histogram, so equal texts embed identically.
#[derive(Default)]
pub struct FakeProvider {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FakeProvider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; DIMENSION];
        for byte in text.bytes() {
            vector[byte as usize % DIMENSION] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn embed(&self, _model: &str, inputs: &[String]) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ProviderError::Status {
                status: 503,
                message: "provider unavailable".into(),
            });
        }
        let tokens = inputs.iter().map(|input| input.split_whitespace().count() as u64).sum();
        Ok(ProviderResponse {
            vectors: inputs.iter().map(|input| Self::vector_for(input)).collect(),
            usage: EmbeddingUsage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }
}

#[derive(Clone)]
struct StoredVector {
    vector: Vec<f32>,
    payload: Map<String, Value>,
}

/// In-process vector index keyed by the same surrogate ids the Qdrant adapter uses.
#[derive(Default)]
pub struct FakeIndex {
    collections: std::sync::Mutex<HashMap<String, HashMap<String, StoredVector>>>,
    upserts: AtomicUsize,
    failures_left: AtomicUsize,
}

impl FakeIndex {
    pub fn fail_next_upsert(&self, count: usize) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    pub fn point_count(&self, document_id: &str) -> usize {
        let collections = self.collections.lock().expect("index lock");
        collections
            .values()
            .flat_map(|points| points.values())
            .filter(|point| point.payload.get("documentId").and_then(Value::as_str) == Some(document_id))
            .count()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let collections = self.collections.lock().expect("index lock");
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl VectorIndex for FakeIndex {
    async fn ensure_collection(&self, name: &str, _model: &str) -> Result<(), QdrantError> {
        let mut collections = self.collections.lock().expect("index lock");
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(
        &self,
        name: &str,
        records: Vec<VectorRecord>,
        _model: &str,
    ) -> Result<UpsertSummary, QdrantError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(QdrantError::UnexpectedStatus {
                status: StatusCode::SERVICE_UNAVAILABLE,
                body: "qdrant unavailable".into(),
            });
        }

        let mut collections = self.collections.lock().expect("index lock");
        let points = collections.entry(name.to_string()).or_default();
        let mut summary = UpsertSummary::default();
        for record in records {
            let point_id = point_id_for_chunk(&record.chunk_id);
            let payload = match serde_json::to_value(&record.payload) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            };
            points.insert(
                point_id.clone(),
                StoredVector {
                    vector: record.vector,
                    payload,
                },
            );
            summary.written.push((record.chunk_id, point_id));
        }
        Ok(summary)
    }

    async fn delete_by_document(&self, name: &str, document_id: &str) -> Result<(), QdrantError> {
        let mut collections = self.collections.lock().expect("index lock");
        if let Some(points) = collections.get_mut(name) {
            points.retain(|_, point| {
                point.payload.get("documentId").and_then(Value::as_str) != Some(document_id)
            });
        }
        Ok(())
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        filter: &SearchFilterArgs,
    ) -> Result<Vec<ScoredPoint>, QdrantError> {
        let collections = self.collections.lock().expect("index lock");
        let Some(points) = collections.get(name) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<ScoredPoint> = points
            .iter()
            .filter(|(_, point)| payload_matches(&point.payload, filter))
            .map(|(id, point)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(&vector, &point.vector).unwrap_or(0.0),
                payload: Some(point.payload.clone()),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn document_points(
        &self,
        name: &str,
        document_id: &str,
    ) -> Result<Vec<StoredPoint>, QdrantError> {
        let collections = self.collections.lock().expect("index lock");
        Ok(collections
            .get(name)
            .map(|points| {
                points
                    .iter()
                    .filter(|(_, point)| {
                        point.payload.get("documentId").and_then(Value::as_str) == Some(document_id)
                    })
                    .map(|(id, point)| StoredPoint {
                        id: id.clone(),
                        payload: point.payload.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

fn payload_matches(payload: &Map<String, Value>, filter: &SearchFilterArgs) -> bool {
    let field_matches = |key: &str, expected: &Option<String>| match expected {
        Some(expected) => payload.get(key).and_then(Value::as_str) == Some(expected.as_str()),
        None => true,
    };
    field_matches("collectionId", &filter.collection_id)
        && field_matches("documentId", &filter.document_id)
}

/// Plain-text extractor that counts invocations.
#[derive(Default)]
pub struct CountingExtractor {
    calls: AtomicUsize,
}

impl CountingExtractor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextExtractor for CountingExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<ExtractedText, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        PlainTextExtractor.extract(bytes, mime_type).await
    }
}

type DownloadHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Default)]
pub struct MemoryBlobs {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    hooks: Mutex<HashMap<String, DownloadHook>>,
}

impl MemoryBlobs {
    pub async fn contains(&self, key: &str) -> bool {
        self.objects.lock().await.contains_key(key)
    }

    /// Run `hook` once, the next time `key` is downloaded, before returning the bytes.
    pub async fn on_download<F, Fut>(&self, key: &str, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: DownloadHook = Box::new(move || Box::pin(hook()) as BoxFuture<'static, ()>);
        self.hooks.lock().await.insert(key.to_string(), hook);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobs {
    async fn download(&self, key: &str) -> Result<Vec<u8>, BlobError> {
        let hook = self.hooks.lock().await.remove(key);
        if let Some(hook) = hook {
            hook().await;
        }
        self.objects
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn upload(&self, key: &str, bytes: &[u8], _mime_type: &str) -> Result<String, BlobError> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(format!("memory://{key}"))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.objects.lock().await.remove(key);
        Ok(())
    }
}

/// Fully wired pipeline over in-process fakes.
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub blobs: Arc<MemoryBlobs>,
    pub extractor: Arc<CountingExtractor>,
    pub provider: Arc<FakeProvider>,
    pub index: Arc<FakeIndex>,
    pub metrics: Arc<PipelineMetrics>,
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub queue: Arc<InMemoryQueue>,
    pub dispatcher: Dispatcher,
    pub settings: QueueSettings,
}

impl Harness {
    pub async fn new(mode: ChunkingMode, chunk_size: usize, chunk_overlap: usize) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let blobs = Arc::new(MemoryBlobs::default());
        let extractor = Arc::new(CountingExtractor::default());
        let provider = Arc::new(FakeProvider::default());
        let index = Arc::new(FakeIndex::default());
        let metrics = Arc::new(PipelineMetrics::new());

        let components = PipelineComponents {
            store: store.clone() as Arc<dyn RecordStore>,
            blobs: blobs.clone() as Arc<dyn BlobStore>,
            extractor: extractor.clone() as Arc<dyn TextExtractor>,
            embeddings: EmbeddingService::new(provider.clone() as Arc<dyn EmbeddingProvider>, 2),
            index: index.clone() as Arc<dyn VectorIndex>,
            metrics: Arc::clone(&metrics),
        };
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            components,
            OrchestratorSettings {
                worker_id: Some("test-worker".into()),
                ..Default::default()
            },
        ));

        let settings = QueueSettings {
            retry_delay_seconds: 0,
            poll_interval_seconds: 0,
            batch_size: 4,
            ..Default::default()
        };
        let queue = Arc::new(InMemoryQueue::new());
        let dispatcher = Dispatcher::new(
            Arc::clone(&orchestrator),
            queue.clone(),
            settings.clone(),
        );

        store
            .save_collection(&Collection {
                id: COLLECTION_ID.into(),
                name: "Research".into(),
                embedding_model: MODEL.into(),
                chunk_size,
                chunk_overlap,
                chunking_mode: mode,
            })
            .await
            .expect("save collection");

        Self {
            store,
            blobs,
            extractor,
            provider,
            index,
            metrics,
            orchestrator,
            queue,
            dispatcher,
            settings,
        }
    }

    pub async fn add_document(&self, id: &str, text: &str, mime_type: &str) -> Document {
        let key = format!("{COLLECTION_ID}/{id}");
        self.blobs
            .upload(&key, text.as_bytes(), mime_type)
            .await
            .expect("upload");
        let document = Document::new(id, COLLECTION_ID, format!("{id}.txt"), key, mime_type, text.len() as u64);
        self.store.save_document(&document).await.expect("save document");
        document
    }

    pub fn consumer(&self) -> QueueConsumer {
        QueueConsumer::new(
            "test-consumer",
            self.queue.clone(),
            Arc::clone(&self.orchestrator),
            self.settings.clone(),
        )
    }
}
