//! Ollama `/api/embed` provider.
//!
//! Talks to the runtime over plain HTTP, the same way the rest of the crate reaches remote
//! services. Ollama reports only `prompt_eval_count`, which is used for both usage fields.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::retry::{RetryPolicy, send_with_retry};
use super::{EmbeddingProvider, EmbeddingUsage, ProviderError, ProviderResponse};

/// Embeddings client for a local or remote Ollama runtime.
#[derive(Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
}

impl OllamaProvider {
    /// Build a client for the runtime at `base_url`.
    pub fn new(base_url: &str, retry: RetryPolicy) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .user_agent("docuralis-ingest/embeddings")
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.base_url)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn embed(&self, model: &str, inputs: &[String]) -> Result<ProviderResponse, ProviderError> {
        if inputs.is_empty() {
            return Ok(ProviderResponse::default());
        }

        let endpoint = self.endpoint();
        let body = json!({ "model": model, "input": inputs });
        let response = send_with_retry(&self.retry, self.name(), || {
            self.client.post(&endpoint).json(&body)
        })
        .await?;

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;
        if parsed.embeddings.len() != inputs.len() {
            return Err(ProviderError::PartialBatch {
                expected: inputs.len(),
                actual: parsed.embeddings.len(),
            });
        }

        let tokens = parsed.prompt_eval_count.unwrap_or_default();
        Ok(ProviderResponse {
            vectors: parsed.embeddings,
            usage: EmbeddingUsage {
                prompt_tokens: tokens,
                total_tokens: tokens,
            },
        })
    }
}
