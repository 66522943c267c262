//! Dealer API server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use fftb_dealer::{spawn_concat_worker, spawn_publish_worker, ContracterConfig};
use fftb_media::{FfmpegEngine, MediaConfig};
use fftb_registry::{FileStore, FileStoreConfig, KvStore, RedisStore, Registry};
use fftb_storage::{LocalStorageController, S3StorageController, StorageController, UniversalClient};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fftb_api::{create_router, metrics, ApiConfig, AppState, RegistryBackend, StorageBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("fftb=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting fftb-api");

    let config = ApiConfig::from_env();
    info!("API config: host={}, port={}", config.host, config.port);

    if config.authority_secret.is_empty() || config.session_secret.is_empty() {
        error!("AUTHORITY_SECRET and SESSION_SECRET must be set");
        std::process::exit(1);
    }

    let cancel = CancellationToken::new();
    let mut background = Vec::new();
    let http = reqwest::Client::new();

    let store: Arc<dyn KvStore> = match config.registry_backend {
        RegistryBackend::File => {
            let store_config = FileStoreConfig::from_env();
            let store = Arc::new(
                FileStore::open(&store_config.path)
                    .await
                    .context("opening registry file")?,
            );
            background.push(FileStore::spawn_maintenance(store.clone(), &store_config, cancel.clone()));
            store
        }
        RegistryBackend::Redis => Arc::new(RedisStore::from_env().context("connecting to redis")?),
    };
    let registry = Registry::new(store);

    let storage: Arc<dyn StorageController> = match config.storage_backend {
        StorageBackend::Local => Arc::new(
            LocalStorageController::new(config.storage_path.clone()).context("preparing local storage")?,
        ),
        StorageBackend::S3 => Arc::new(S3StorageController::from_env(http.clone()).context("configuring s3 storage")?),
    };

    let engine = FfmpegEngine::new(MediaConfig::from_env());
    if config.contracter_enabled {
        if let Err(e) = engine.check() {
            warn!("Contracter enabled but FFmpeg is not available: {}", e);
        }
    }

    let state = AppState::new(
        config.clone(),
        registry,
        storage,
        Arc::new(UniversalClient::with_defaults(http)),
        Arc::new(engine),
        ContracterConfig::from_env(),
    );

    if config.contracter_enabled {
        info!("Contracter workers enabled");
        background.push(spawn_publish_worker(state.contracter.clone(), cancel.clone()));
        background.push(spawn_concat_worker(state.contracter.clone(), cancel.clone()));
    }

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);

    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("installing metrics recorder")?)
    } else {
        None
    };

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    for handle in background {
        handle.await.ok();
    }

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received shutdown signal"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
