use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docuralis_ingest::{
    api,
    blob::{BlobStore, LocalBlobStore},
    config::Config,
    embedding::{self, EmbeddingService},
    extraction::PlainTextExtractor,
    logging,
    metrics::PipelineMetrics,
    processing::{
        ChunkingMode, ChunkingService, OrchestratorSettings, PipelineComponents,
        PipelineOrchestrator,
    },
    qdrant::{QdrantService, VectorIndex},
    queue::{Dispatcher, InMemoryQueue, QueueTransport, spawn_consumers},
    service::IngestService,
    store::{Collection, Document, InMemoryStore, RecordStore},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use walkdir::WalkDir;

const DEFAULT_COLLECTION_ID: &str = "default";
const DEFAULT_CHUNK_SIZE: usize = 300;

#[derive(Parser)]
#[command(
    name = "docuralis-ingest",
    about = "Resumable document ingestion worker and operator API"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run queue consumers and the operator HTTP API.
    Serve {
        /// Upload and enqueue every file under this directory into the default collection.
        #[arg(long)]
        seed_dir: Option<PathBuf>,
    },
    /// Chunk a local file and print the chunks as JSON.
    Chunk {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = "words")]
        mode: ChunkingMode,
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        size: usize,
        #[arg(long, default_value_t = 0)]
        overlap: usize,
        /// Model whose tokenizer produces the advisory token counts.
        #[arg(long, default_value = "text-embedding-3-small")]
        model: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve { seed_dir } => {
            logging::init_tracing();
            serve(seed_dir).await
        }
        Command::Chunk {
            file,
            mode,
            size,
            overlap,
            model,
        } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chunks = ChunkingService::for_model(&model).chunk_with_mode(mode, &text, size, overlap)?;
            println!("{}", serde_json::to_string_pretty(&chunks)?);
            Ok(())
        }
    }
}

async fn serve(seed_dir: Option<PathBuf>) -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;

    let provider = embedding::build_provider(&config).context("Failed to build embedding provider")?;
    let index: Arc<dyn VectorIndex> = Arc::new(
        QdrantService::new(&config.qdrant_url, config.qdrant_api_key.clone())
            .context("Failed to configure Qdrant client")?,
    );
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryStore::new());
    let blobs: Arc<dyn BlobStore> = Arc::new(LocalBlobStore::new(&config.blob_root));

    let components = PipelineComponents {
        store: Arc::clone(&store),
        blobs: Arc::clone(&blobs),
        extractor: Arc::new(PlainTextExtractor),
        embeddings: EmbeddingService::new(provider, config.embedding_batch_size),
        index,
        metrics: Arc::new(PipelineMetrics::new()),
    };
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        components,
        OrchestratorSettings {
            collection_prefix: config.qdrant_collection_prefix.clone(),
            worker_id: Some(config.worker_id.clone()),
            max_attempts: config.queue.retry_limit + 1,
        },
    ));
    let queue: Arc<dyn QueueTransport> = Arc::new(InMemoryQueue::with_retention(config.queue.retention()));
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&orchestrator),
        Arc::clone(&queue),
        config.queue.clone(),
    ));

    store
        .save_collection(&Collection {
            id: DEFAULT_COLLECTION_ID.into(),
            name: "Default".into(),
            embedding_model: config.embedding_model.clone(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: 0,
            chunking_mode: ChunkingMode::Words,
        })
        .await?;

    if let Some(dir) = seed_dir {
        let seeded = seed_directory(&dir, store.as_ref(), blobs.as_ref(), &dispatcher).await?;
        tracing::info!(dir = %dir.display(), documents = seeded, "Seeded documents");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = spawn_consumers(
        config.worker_concurrency,
        &config.worker_id,
        queue,
        Arc::clone(&orchestrator),
        &config.queue,
        &shutdown_rx,
    );

    let app = api::create_router(Arc::new(IngestService::new(orchestrator, dispatcher)));
    let (listener, port) = bind_listener(config.server_port)
        .await
        .context("Failed to bind listener")?;
    tracing::info!("Listening on http://0.0.0.0:{}", port);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %error, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    tracing::info!("Shutting down queue consumers");
    let _ = shutdown_tx.send(true);
    for worker in workers {
        if let Err(error) = worker.await {
            tracing::error!(error = %error, "Queue consumer panicked");
        }
    }
    Ok(())
}

async fn seed_directory(
    dir: &Path,
    store: &dyn RecordStore,
    blobs: &dyn BlobStore,
    dispatcher: &Dispatcher,
) -> Result<usize> {
    let mut seeded = 0;
    for entry in WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mime_type = mime_for(path);

        let id = uuid::Uuid::new_v4().to_string();
        let storage_key = format!("{DEFAULT_COLLECTION_ID}/{id}");
        blobs.upload(&storage_key, &bytes, mime_type).await?;
        store
            .save_document(&Document::new(
                &id,
                DEFAULT_COLLECTION_ID,
                name,
                storage_key,
                mime_type,
                bytes.len() as u64,
            ))
            .await?;
        dispatcher.enqueue_document(&id).await?;
        seeded += 1;
    }
    Ok(seeded)
}

fn mime_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("md" | "markdown") => "text/markdown",
        Some("html" | "htm") => "text/html",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("pdf") => "application/pdf",
        _ => "text/plain",
    }
}

async fn bind_listener(port: Option<u16>) -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    if let Some(port) = port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4100..=4199;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4100-4199",
    ))
}
