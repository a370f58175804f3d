//! Axum API server binary.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aura_api::{create_router, metrics, ApiConfig, AppState, LiveConnections};
use aura_media::{check_ffmpeg, check_ffprobe, FfmpegRunner, FfmpegVideoBackend, OrtModelLoader, PostFilter};
use aura_storage::SpacesClient;
use aura_worker::{JobExecutor, JobPipeline, PipelineDeps, ProgressReporter, WorkerConfig};

/// How long in-flight jobs get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Install rustls crypto provider (required for rustls 0.23+)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    init_tracing()?;
    info!("Starting aura-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, max_jobs={}, work_dir={}",
        config.host,
        config.port,
        worker_config.max_concurrent_jobs,
        worker_config.work_dir.display()
    );
    if config.jwt_secret.is_none() {
        warn!("AURA_JWT_SECRET not set, progress sockets trust the user_id query parameter");
    }

    for check in [check_ffmpeg(), check_ffprobe()] {
        if let Err(e) = check {
            warn!("{}; video jobs will fail until it is installed", e);
        }
    }

    tokio::fs::create_dir_all(&worker_config.work_dir)
        .await
        .with_context(|| format!("Failed to create {}", worker_config.work_dir.display()))?;

    let spaces = SpacesClient::from_env().context("Failed to configure Spaces client")?;
    spaces.ensure_space().await.context("Failed to ensure Spaces bucket")?;

    let metrics_enabled = std::env::var("METRICS_ENABLED")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(true);
    let metrics_handle = if metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics().context("Failed to install Prometheus recorder")?)
    } else {
        None
    };

    let connections = Arc::new(LiveConnections::new());
    let deps = PipelineDeps {
        video: Arc::new(FfmpegVideoBackend::new()),
        models: Arc::new(OrtModelLoader::new()),
        commands: Arc::new(FfmpegRunner::new()),
        uploader: Arc::new(spaces),
        progress: ProgressReporter::new(connections.clone()),
        filter: Arc::new(PostFilter::default()),
        source_config: worker_config.source_config(),
    };
    let executor = JobExecutor::new(&worker_config, JobPipeline::new(deps));
    let state = AppState::new(config.clone(), worker_config, executor, connections);
    let executor = Arc::clone(&state.executor);

    let app = create_router(state, metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("Invalid bind address")?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    executor.shutdown();
    info!("Waiting for in-flight jobs to complete...");
    if tokio::time::timeout(SHUTDOWN_GRACE, executor.wait_idle()).await.is_err() {
        warn!("In-flight jobs still running after {:?}", SHUTDOWN_GRACE);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Colored output for dev, JSON for production.
fn init_tracing() -> anyhow::Result<()> {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("aura=info".parse()?)
        .add_directive("ort=warn".parse()?);

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
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal");
}
