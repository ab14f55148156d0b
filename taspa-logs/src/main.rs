//! taspa-logs - Progress log broadcaster
//!
//! Stores progress events posted by workers and streams them live to
//! viewers over Server-Sent Events.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use taspa_common::config::TomlConfig;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taspa_logs::{build_router, AppState};

/// Command-line arguments for taspa-logs
#[derive(Parser, Debug)]
#[command(name = "taspa-logs")]
#[command(about = "Progress log broadcaster")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8010", env = "TASPA_LOGS_PORT")]
    port: u16,

    /// Bootstrap config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shared database file (overrides config)
    #[arg(long)]
    database: Option<PathBuf>,
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
        "Starting TASPA Log Broadcaster (taspa-logs) v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    if let Some(path) = args.database {
        config.database_path = path;
    }

    info!("Database: {}", config.database_path.display());
    let db = taspa_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    let state = AppState::new(db, &config.auth.jwt_secret);
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("taspa-logs listening on http://{}", addr);
    info!("Live stream: http://{}/logs/stream", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

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
