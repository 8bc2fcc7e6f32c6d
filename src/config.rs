use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion worker and its operator API.
///
/// Loaded once near process start and handed to constructors by value or reference; components
/// never consult the environment on their own.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores embeddings.
    pub qdrant_url: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Prefix for vector-store collection names; one collection is kept per embedding model.
    pub qdrant_collection_prefix: String,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProviderKind,
    /// Default embedding model assigned to collections created by this process.
    pub embedding_model: String,
    /// Maximum number of inputs sent to the provider in one request.
    pub embedding_batch_size: usize,
    /// Provider-level retries for rate limits and transient failures.
    pub embedding_max_retries: u32,
    /// API key for the OpenAI-compatible provider.
    pub openai_api_key: Option<String>,
    /// Base URL for the OpenAI-compatible provider.
    pub openai_base_url: String,
    /// Base URL for the Ollama runtime.
    pub ollama_url: String,
    /// Root directory of the filesystem blob store.
    pub blob_root: String,
    /// Queue settings shared by the dispatcher and the consumers.
    pub queue: QueueSettings,
    /// Number of independent consumers polling the queue.
    pub worker_concurrency: usize,
    /// Identity stamped onto processing jobs claimed by this process.
    pub worker_id: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Queue transport settings: retry, backoff, and expiration policy.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    /// Queue name used for document processing work items.
    pub name: String,
    /// Number of jobs claimed per poll.
    pub batch_size: usize,
    /// Delay between polls when the queue is idle.
    pub poll_interval_seconds: u64,
    /// Retries after the first attempt.
    pub retry_limit: u32,
    /// Base retry delay; doubled per attempt.
    pub retry_delay_seconds: u64,
    /// Window after which an active job is considered abandoned.
    pub expire_seconds: u64,
    /// How long completed, failed, and cancelled jobs are kept before being dropped.
    pub retention_seconds: u64,
}

impl QueueSettings {
    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Settled-job retention as a [`Duration`].
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_seconds)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            name: "document-processing".into(),
            batch_size: 1,
            poll_interval_seconds: 2,
            retry_limit: 3,
            retry_delay_seconds: 30,
            expire_seconds: 4 * 60 * 60,
            retention_seconds: 12 * 60 * 60,
        }
    }
}

/// Supported embedding backends for the processing pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// Local Ollama runtime.
    Ollama,
    /// Hosted OpenAI (or OpenAI-compatible) embeddings API.
    OpenAI,
}

impl Config {
    /// Load `.env` (when present) and then read configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            qdrant_url = %config.qdrant_url,
            prefix = %config.qdrant_collection_prefix,
            embedding_provider = ?config.embedding_provider,
            embedding_model = %config.embedding_model,
            queue = %config.queue.name,
            workers = config.worker_concurrency,
            server_port = ?config.server_port,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Read configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = QueueSettings::default();
        let embedding_provider = load_env("EMBEDDING_PROVIDER")?
            .parse()
            .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".to_string()))?;
        let openai_api_key = load_env_optional("OPENAI_API_KEY");
        if embedding_provider == EmbeddingProviderKind::OpenAI && openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }

        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            qdrant_collection_prefix: load_env_optional("QDRANT_COLLECTION_PREFIX")
                .unwrap_or_else(|| "documents".into()),
            embedding_provider,
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".into()),
            embedding_batch_size: parse_optional("EMBEDDING_BATCH_SIZE")?.unwrap_or(100),
            embedding_max_retries: parse_optional("EMBEDDING_MAX_RETRIES")?.unwrap_or(3),
            openai_api_key,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            ollama_url: load_env_optional("OLLAMA_URL")
                .unwrap_or_else(|| "http://127.0.0.1:11434".into()),
            blob_root: load_env_optional("BLOB_ROOT").unwrap_or_else(|| "data/blobs".into()),
            queue: QueueSettings {
                name: load_env_optional("QUEUE_NAME").unwrap_or(defaults.name),
                batch_size: parse_optional("QUEUE_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
                poll_interval_seconds: parse_optional("QUEUE_POLL_INTERVAL_SECONDS")?
                    .unwrap_or(defaults.poll_interval_seconds),
                retry_limit: parse_optional("JOB_RETRY_LIMIT")?.unwrap_or(defaults.retry_limit),
                retry_delay_seconds: parse_optional("JOB_RETRY_DELAY_SECONDS")?
                    .unwrap_or(defaults.retry_delay_seconds),
                expire_seconds: parse_optional("JOB_EXPIRE_SECONDS")?
                    .unwrap_or(defaults.expire_seconds),
                retention_seconds: parse_optional("JOB_RETENTION_SECONDS")?
                    .unwrap_or(defaults.retention_seconds),
            },
            worker_concurrency: parse_optional("WORKER_CONCURRENCY")?.unwrap_or(2),
            worker_id: load_env_optional("WORKER_ID")
                .unwrap_or_else(|| format!("worker-{}", uuid::Uuid::new_v4())),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl FromStr for EmbeddingProviderKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}
