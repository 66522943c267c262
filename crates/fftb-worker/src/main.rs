//! Segment performer binary.

use std::sync::Arc;

use fftb_dealer::RemoteDealer;
use fftb_media::FfmpegEngine;
use fftb_models::Author;
use fftb_storage::UniversalClient;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fftb_worker::{SegmentHandler, Worker, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();

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

    info!("Starting fftb-worker");

    let config = WorkerConfig::from_env();
    info!(dealer_url = %config.dealer_url, name = %config.name, "Worker config loaded");

    if config.authority_key.is_empty() {
        error!("AUTHORITY_KEY is not set");
        std::process::exit(1);
    }

    let engine = FfmpegEngine::new(config.media.clone());
    if let Err(e) = engine.check() {
        error!("FFmpeg is not available: {}", e);
        std::process::exit(1);
    }

    let http = reqwest::Client::new();
    let storage = Arc::new(UniversalClient::with_defaults(http.clone()));
    let dealer = Arc::new(RemoteDealer::new(
        config.dealer_url.clone(),
        config.authority_key.clone(),
        http,
        storage,
    ));

    let performer = Author::performer(&config.name);
    let handler = SegmentHandler::new(
        dealer.clone(),
        Arc::new(engine),
        performer.clone(),
        config.tmp_dir.clone(),
        config.notify_throttle,
    );
    let worker = Worker::new(dealer, handler, performer, config.free_segment_delay);

    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown.cancel();
    });

    worker.run(cancel).await;

    info!("Worker shutdown complete");
    Ok(())
}
