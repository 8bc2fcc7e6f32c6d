//! OpenAI-compatible `/embeddings` provider.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

use super::retry::{RetryPolicy, send_with_retry};
use super::{EmbeddingProvider, EmbeddingUsage, ProviderError, ProviderResponse};

/// Embeddings client for OpenAI and API-compatible gateways.
#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    endpoint: String,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// Build a client posting to `<base_url>/embeddings` with a bearer token.
    pub fn new(base_url: &str, api_key: &str, retry: RetryPolicy) -> Result<Self, ProviderError> {
        if api_key.trim().is_empty() {
            return Err(ProviderError::Configuration("missing OpenAI API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| ProviderError::Configuration("invalid OpenAI API key".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .user_agent("docuralis-ingest/embeddings")
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            retry,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<UsageBody>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn embed(&self, model: &str, inputs: &[String]) -> Result<ProviderResponse, ProviderError> {
        if inputs.is_empty() {
            return Ok(ProviderResponse::default());
        }

        let body = EmbeddingRequest {
            model,
            input: inputs,
        };
        let response = send_with_retry(&self.retry, self.name(), || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| ProviderError::InvalidResponse(error.to_string()))?;
        if parsed.data.len() != inputs.len() {
            return Err(ProviderError::PartialBatch {
                expected: inputs.len(),
                actual: parsed.data.len(),
            });
        }
        parsed.data.sort_by_key(|entry| entry.index);

        let usage = parsed
            .usage
            .map(|usage| EmbeddingUsage {
                prompt_tokens: usage.prompt_tokens,
                total_tokens: usage.total_tokens,
            })
            .unwrap_or_default();

        Ok(ProviderResponse {
            vectors: parsed.data.into_iter().map(|entry| entry.embedding).collect(),
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn provider(server: &MockServer, retries: u32) -> OpenAiProvider {
        OpenAiProvider::new(
            &format!("{}/v1", server.base_url()),
            "sk-test",
            RetryPolicy::immediate(retries),
        )
        .expect("provider")
    }

    #[tokio::test]
    async fn orders_vectors_by_index_and_reads_usage() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({"model": "text-embedding-3-small", "input": ["a", "b"]}));
                then.status(200).json_body(json!({
                    "data": [
                        {"embedding": [0.0, 2.0], "index": 1},
                        {"embedding": [1.0, 0.0], "index": 0}
                    ],
                    "usage": {"prompt_tokens": 4, "total_tokens": 4}
                }));
            })
            .await;

        let response = provider(&server, 0)
            .embed("text-embedding-3-small", &["a".into(), "b".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(response.vectors, vec![vec![1.0, 0.0], vec![0.0, 2.0]]);
        assert_eq!(response.usage.total_tokens, 4);
    }

    #[tokio::test]
    async fn preserves_upstream_error_message() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(401).body("invalid api key provided");
            })
            .await;

        let error = provider(&server, 2)
            .embed("m", &["a".into()])
            .await
            .unwrap_err();
        match error {
            ProviderError::Status { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key provided");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn retries_rate_limits_until_exhausted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(429).body("slow down");
            })
            .await;

        let error = provider(&server, 2)
            .embed("m", &["a".into()])
            .await
            .unwrap_err();
        mock.assert_hits(3);
        assert!(matches!(error, ProviderError::Status { status: 429, .. }));
    }

    #[tokio::test]
    async fn short_responses_are_partial_batches() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/embeddings");
                then.status(200)
                    .json_body(json!({"data": [{"embedding": [1.0], "index": 0}]}));
            })
            .await;

        let error = provider(&server, 0)
            .embed("m", &["a".into(), "b".into()])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ProviderError::PartialBatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn rejects_blank_api_key() {
        assert!(matches!(
            OpenAiProvider::new("http://localhost", "  ", RetryPolicy::default()),
            Err(ProviderError::Configuration(_))
        ));
    }
}
