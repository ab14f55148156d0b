//! taspa-worker - Per-platform scrape worker
//!
//! Consumes job announcements on a background task and serves a health
//! endpoint. Run one process per platform (`--platform vk`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use taspa_common::broker::Binding;
use taspa_common::config::TomlConfig;
use taspa_common::Platform;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taspa_worker::consumer::default_consumer_name;
use taspa_worker::{
    build_router, AppState, Consumer, ConsumerStats, HttpConfigSource, HttpProgressSink, JobRunner,
};

/// Command-line arguments for taspa-worker
#[derive(Parser, Debug)]
#[command(name = "taspa-worker")]
#[command(about = "Per-platform scrape worker")]
#[command(version)]
struct Args {
    /// Platform this worker executes jobs for (vk, instagram, tiktok)
    #[arg(long, env = "TASPA_WORKER_PLATFORM")]
    platform: Platform,

    /// Port to listen on
    #[arg(short, long, default_value = "8020", env = "TASPA_WORKER_PORT")]
    port: u16,

    /// Bootstrap config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Broker URL, `memory` or `nats://host:port` (overrides config)
    #[arg(long)]
    broker_url: Option<String>,

    /// Durable consumer name; instances given the same name split the
    /// announcements between them (default `taspa-worker-<platform>-<host>-<port>`)
    #[arg(long, env = "TASPA_WORKER_CONSUMER")]
    consumer_name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = TomlConfig::load(args.config.as_deref()).context("Failed to load config")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting TASPA Worker (taspa-worker, platform {}) v{} [{}] built {} ({})",
        args.platform,
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(path) = args.database {
        config.database_path = path;
    }
    if let Some(url) = args.broker_url {
        config.broker.url = url;
    }

    info!("Database: {}", config.database_path.display());
    let db = taspa_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let progress = HttpProgressSink::new(&config.services.logs_url)
        .context("Failed to build log service client")?;
    let config_source = HttpConfigSource::new(&config.services.orchestrator_url)
        .context("Failed to build orchestrator client")?;
    let runner = Arc::new(JobRunner::new(
        db,
        args.platform,
        Arc::new(progress),
        Arc::new(config_source),
    ));

    let binding = if config.broker.platform_routing {
        Binding::Platform(args.platform)
    } else {
        Binding::All
    };
    let consumer_name = args
        .consumer_name
        .unwrap_or_else(|| {
            let host = std::env::var("HOSTNAME").ok();
            default_consumer_name(args.platform, host.as_deref(), args.port)
        });
    info!("Broker consumer: {}", consumer_name);
    let stats = Arc::new(ConsumerStats::default());
    let cancel = CancellationToken::new();

    // Consume loop runs beside the HTTP server so health checks stay responsive
    let consumer_task = {
        let broker_config = config.broker.clone();
        let stats = Arc::clone(&stats);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let Some(broker) =
                taspa_worker::consumer::connect_with_retry(&broker_config, &consumer_name, &cancel)
                    .await
            else {
                return;
            };
            Consumer::new(broker, runner, binding, stats).run(cancel).await;
        })
    };

    let state = AppState::new(args.platform, stats);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("taspa-worker ({}) listening on http://{}", args.platform, addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // The job in flight, if any, runs to completion before the loop exits
    cancel.cancel();
    if let Err(e) = consumer_task.await {
        tracing::error!("Consumer task ended abnormally: {}", e);
    }

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
}
