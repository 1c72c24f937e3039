use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use voxnote_core::{CategoryRepository, EntryRepository};
use voxnote_db::{Database, FilesystemAudioStore, MemoryStore, PoolConfig};
use voxnote_inference::{LlmClassifier, OpenAIBackend, WhisperBackend};
use voxnote_ingest::{IngestConfig, IngestService, IngestionPipeline};

use voxnote_api::{app, spawn_retention_sweep, ApiConfig, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter (default: voxnote crates at debug/info, tower_http=debug)
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "voxnote_api=debug,voxnote_ingest=debug,voxnote_db=info,voxnote_inference=info,tower_http=debug"
            .into()
    });

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("voxnote-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false));
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    let config = ApiConfig::from_env();

    // Remote store: PostgreSQL when configured, otherwise in-memory
    let (categories, entries): (Arc<dyn CategoryRepository>, Arc<dyn EntryRepository>) =
        match &config.database_url {
            Some(url) => {
                let db = Database::connect_with_config(url, &PoolConfig::from_env()).await?;
                db.migrate().await?;
                info!(subsystem = "api", "Connected to PostgreSQL, migrations applied");
                let Database {
                    categories, entries, ..
                } = db;
                (Arc::new(categories), Arc::new(entries))
            }
            None => {
                warn!(
                    subsystem = "api",
                    "DATABASE_URL not set, using the in-memory store (data is lost on restart)"
                );
                let store = MemoryStore::new();
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

    // Inference backends
    let backend = Arc::new(OpenAIBackend::from_env()?);
    let classifier = Arc::new(LlmClassifier::new(backend.clone()));
    let ingest_config = IngestConfig::from_env();
    info!(
        subsystem = "api",
        max_categories = ingest_config.max_categories,
        text_threshold = ingest_config.text_similarity_threshold,
        audio_threshold = ingest_config.audio_similarity_threshold,
        "Ingestion configured"
    );
    let mut pipeline = IngestionPipeline::new(
        categories.clone(),
        entries.clone(),
        classifier,
        backend,
    )
    .with_config(ingest_config);

    let audio = config
        .audio_storage_path
        .as_ref()
        .map(FilesystemAudioStore::new);
    match (&audio, WhisperBackend::from_env()) {
        (Some(store), Some(whisper)) => {
            info!(subsystem = "api", "Audio re-transcription enabled");
            pipeline = pipeline.with_audio(Arc::new(store.clone()), Arc::new(whisper));
        }
        (Some(_), None) => info!(
            subsystem = "api",
            "Audio uploads enabled, WHISPER_BASE_URL not set so device transcripts are used"
        ),
        _ => {}
    }

    let service = IngestService::new(categories, entries.clone(), Arc::new(pipeline));
    let mut state = AppState::new(service, entries);
    if let Some(store) = audio {
        state = state.with_audio(store);
    }

    let sweep = spawn_retention_sweep(
        state.clone(),
        config.audio_retention,
        config.sweep_interval,
    );

    // Start server
    let addr = config.bind_addr()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        })
        .await?;

    sweep.shutdown().await?;
    Ok(())
}
