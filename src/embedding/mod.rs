//! Embedding generation over a pluggable provider.
//!
//! [`EmbeddingService`] validates input, partitions batches, and aggregates provider-reported
//! usage. Vendors plug in through [`EmbeddingProvider`]; one implementation exists per vendor
//! and the active one is picked by configuration in [`build_provider`].

mod models;
pub mod ollama;
pub mod openai;
mod retry;
mod similarity;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::config::{Config, EmbeddingProviderKind};

pub use models::dimension_for;
pub use retry::RetryPolicy;
pub use similarity::cosine_similarity;

/// Failures raised by a remote embedding provider.
///
/// Upstream messages are carried verbatim.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure talking to the provider.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider answered with a non-success status.
    #[error("Embedding provider returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the provider.
        message: String,
    },
    /// Provider answered with a body we could not interpret.
    #[error("Invalid embedding response: {0}")]
    InvalidResponse(String),
    /// Provider returned a different number of vectors than inputs.
    #[error("Provider returned {actual} embeddings for {expected} inputs")]
    PartialBatch {
        /// Inputs sent in the sub-batch.
        expected: usize,
        /// Vectors received.
        actual: usize,
    },
    /// Client could not be constructed from configuration.
    #[error("Invalid provider configuration: {0}")]
    Configuration(String),
}

/// Errors surfaced by [`EmbeddingService`] and the vector utilities.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Input text (or input array) was empty.
    #[error("Embedding input is empty")]
    EmptyInput,
    /// Every element of a batch was empty after filtering.
    #[error("No non-empty inputs to embed")]
    NoValidInput,
    /// Vectors of different lengths were compared.
    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch {
        /// Length of the first vector.
        left: usize,
        /// Length of the second vector.
        right: usize,
    },
    /// Model is missing from the dimension table.
    #[error("Unsupported embedding model '{0}'")]
    UnsupportedModel(String),
    /// Remote provider failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl EmbeddingError {
    /// Local validation errors indicate a caller bug; only provider failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider(_))
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmbeddingUsage {
    /// Prompt tokens consumed.
    pub prompt_tokens: u64,
    /// Total tokens billed.
    pub total_tokens: u64,
}

impl std::ops::AddAssign for EmbeddingUsage {
    fn add_assign(&mut self, other: Self) {
        self.prompt_tokens += other.prompt_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Raw provider answer for one request.
#[derive(Debug, Clone, Default)]
pub struct ProviderResponse {
    /// One vector per input, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Provider-reported usage for the request.
    pub usage: EmbeddingUsage,
}

/// Vendor adapter producing vectors for a list of inputs.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short vendor name used in logs.
    fn name(&self) -> &'static str;

    /// Embed `inputs` with `model`, returning vectors in input order.
    async fn embed(&self, model: &str, inputs: &[String]) -> Result<ProviderResponse, ProviderError>;
}

/// Single-text embedding result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embedding {
    /// Embedding vector.
    pub vector: Vec<f32>,
    /// Model that produced it.
    pub model: String,
    /// Provider-reported usage.
    pub usage: EmbeddingUsage,
}

/// Batch embedding result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchEmbedding {
    /// Vectors for the non-empty inputs, in input order.
    pub vectors: Vec<Vec<f32>>,
    /// Model that produced them.
    pub model: String,
    /// Usage summed across sub-batches.
    pub usage: EmbeddingUsage,
}

/// Validating, batching front-end over an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingService {
    /// Wrap `provider`; `batch_size` is the default sub-batch bound.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    /// Default sub-batch bound.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed a single text.
    pub async fn embed(&self, text: &str, model: &str) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let inputs = [text.to_string()];
        let response = self.provider.embed(model, &inputs).await?;
        let actual = response.vectors.len();
        let vector = response
            .vectors
            .into_iter()
            .next()
            .filter(|_| actual == 1)
            .ok_or(ProviderError::PartialBatch {
                expected: 1,
                actual,
            })?;

        Ok(Embedding {
            vector,
            model: model.to_string(),
            usage: response.usage,
        })
    }

    /// Embed many texts, dropping empty entries and preserving the order of the rest.
    pub async fn embed_batch(
        &self,
        texts: &[String],
        model: &str,
        batch_size: usize,
    ) -> Result<BatchEmbedding, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let inputs: Vec<String> = texts
            .iter()
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .collect();
        if inputs.is_empty() {
            return Err(EmbeddingError::NoValidInput);
        }

        let batch_size = batch_size.max(1);
        let mut vectors = Vec::with_capacity(inputs.len());
        let mut usage = EmbeddingUsage::default();

        for (batch_index, batch) in inputs.chunks(batch_size).enumerate() {
            tracing::debug!(
                provider = self.provider.name(),
                model,
                batch_index,
                inputs = batch.len(),
                "Embedding sub-batch"
            );
            let response = self.provider.embed(model, batch).await?;
            if response.vectors.len() != batch.len() {
                return Err(ProviderError::PartialBatch {
                    expected: batch.len(),
                    actual: response.vectors.len(),
                }
                .into());
            }
            vectors.extend(response.vectors);
            usage += response.usage;
        }

        Ok(BatchEmbedding {
            vectors,
            model: model.to_string(),
            usage,
        })
    }

    /// Embed a retrieval query and return only the vector.
    pub async fn embed_query(&self, text: &str, model: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed(text, model).await?.vector)
    }
}

/// Build the provider selected by configuration.
pub fn build_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>, ProviderError> {
    let retry = RetryPolicy::with_max_retries(config.embedding_max_retries);
    match config.embedding_provider {
        EmbeddingProviderKind::OpenAI => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                ProviderError::Configuration("OPENAI_API_KEY is not set".into())
            })?;
            let provider = openai::OpenAiProvider::new(&config.openai_base_url, &api_key, retry)?;
            Ok(Arc::new(provider))
        }
        EmbeddingProviderKind::Ollama => {
            let provider = ollama::OllamaProvider::new(&config.ollama_url, retry)?;
            Ok(Arc::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns `[position_in_batch, len(text)]` and records every call.
    #[derive(Default)]
    struct RecordingProvider {
        calls: Mutex<Vec<Vec<String>>>,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingProvider {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn embed(
            &self,
            _model: &str,
            inputs: &[String],
        ) -> Result<ProviderResponse, ProviderError> {
            self.calls.lock().unwrap().push(inputs.to_vec());
            let mut vectors: Vec<Vec<f32>> = inputs
                .iter()
                .map(|text| vec![text.len() as f32, 1.0])
                .collect();
            if self.drop_last {
                vectors.pop();
            }
            Ok(ProviderResponse {
                vectors,
                usage: EmbeddingUsage {
                    prompt_tokens: inputs.len() as u64,
                    total_tokens: inputs.len() as u64,
                },
            })
        }
    }

    fn service(provider: Arc<RecordingProvider>) -> EmbeddingService {
        EmbeddingService::new(provider, 100)
    }

    #[tokio::test]
    async fn embed_rejects_blank_text() {
        let svc = service(Arc::new(RecordingProvider::default()));
        assert!(matches!(
            svc.embed("   ", "m").await,
            Err(EmbeddingError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn batch_drops_empty_entries() {
        let provider = Arc::new(RecordingProvider::default());
        let svc = service(provider.clone());
        let texts = vec!["".to_string(), "  ".to_string(), "hello".to_string()];
        let result = svc.embed_batch(&texts, "m", 10).await.expect("batch");
        assert_eq!(result.vectors.len(), 1);
        assert_eq!(result.vectors[0][0], 5.0);
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn batch_preserves_order_across_sub_batches() {
        let provider = Arc::new(RecordingProvider::default());
        let svc = service(provider.clone());
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let result = svc.embed_batch(&texts, "m", 2).await.expect("batch");
        let lengths: Vec<f32> = result.vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(provider.calls.lock().unwrap().len(), 3);
        assert_eq!(result.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn batch_rejects_empty_and_blank_inputs() {
        let svc = service(Arc::new(RecordingProvider::default()));
        assert!(matches!(
            svc.embed_batch(&[], "m", 2).await,
            Err(EmbeddingError::EmptyInput)
        ));
        let blanks = vec![" ".to_string(), "\n".to_string()];
        assert!(matches!(
            svc.embed_batch(&blanks, "m", 2).await,
            Err(EmbeddingError::NoValidInput)
        ));
    }

    #[tokio::test]
    async fn partial_batches_fail_instead_of_mis_zipping() {
        let provider = Arc::new(RecordingProvider {
            drop_last: true,
            ..Default::default()
        });
        let svc = service(provider);
        let texts = vec!["one".to_string(), "two".to_string()];
        let error = svc.embed_batch(&texts, "m", 10).await.unwrap_err();
        assert!(matches!(
            error,
            EmbeddingError::Provider(ProviderError::PartialBatch {
                expected: 2,
                actual: 1
            })
        ));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn embed_query_returns_vector() {
        let svc = service(Arc::new(RecordingProvider::default()));
        let vector = svc.embed_query("abc", "m").await.expect("vector");
        assert_eq!(vector, vec![3.0, 1.0]);
    }

    #[test]
    fn local_errors_are_not_retryable() {
        assert!(!EmbeddingError::EmptyInput.is_retryable());
        assert!(!EmbeddingError::UnsupportedModel("x".into()).is_retryable());
    }
}
