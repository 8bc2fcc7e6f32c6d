use std::{env, sync::Once};

use docuralis_ingest::{
    config::Config,
    embedding::{self, EmbeddingService, dimension_for},
    qdrant::{QdrantService, collection_name_for_model},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn live_config() -> Config {
    INIT.call_once(|| {
        set_default_env("QDRANT_URL", "http://127.0.0.1:6333");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
    });
    Config::from_env().expect("live configuration")
}

#[tokio::test]
#[ignore = "Requires live Qdrant"]
async fn live_qdrant_collection_is_created_idempotently() {
    let config = live_config();
    let service = QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())
        .expect("qdrant client");
    let name = collection_name_for_model("live-validation", &config.embedding_model);

    service
        .ensure_collection(&name, &config.embedding_model)
        .await
        .expect("first ensure");
    service
        .ensure_collection(&name, &config.embedding_model)
        .await
        .expect("second ensure is a no-op");
    assert!(service.collection_exists(&name).await.expect("exists"));
}

#[tokio::test]
#[ignore = "Requires live embedding provider"]
async fn live_embedding_matches_model_dimension() {
    let config = live_config();
    let provider = embedding::build_provider(&config).expect("provider");
    let service = EmbeddingService::new(provider, config.embedding_batch_size);

    let batch = service
        .embed_batch(
            &["docuralis live embedding".to_string(), "second input".to_string()],
            &config.embedding_model,
            config.embedding_batch_size,
        )
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(batch.vectors.len(), 2, "expected one embedding per input");
    let dimension = dimension_for(&config.embedding_model).expect("known model");
    assert!(batch.vectors.iter().all(|vector| vector.len() == dimension));
}
