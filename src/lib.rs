use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::signal;
use tracing_subscriber::EnvFilter;

pub mod config;
pub mod download;
pub mod error;
pub mod events;
pub mod formats;
pub mod metadata;
pub mod models;
pub mod process;
pub mod proxy;
pub mod resolver;
pub mod server;
pub mod url_utils;
pub mod ytdlp;

use config::Config;
use server::{build_router, AppState};

/// Install the log sink. `RUST_LOG` overrides the default `info` level.
///
/// The `log` macros used across the crate are picked up through the
/// subscriber's `log` bridge.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> Result<()> {
    let state = AppState::from_config(&config)?;
    let app = build_router(state, config.allowed_origin.clone());

    log::info!("Using yt-dlp at {:?}", config.yt_dlp_path);
    if config.download_timeout.is_none() {
        log::warn!("Download timeout disabled; a hung yt-dlp will hold its request open");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    log::info!("Server is running on http://localhost:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    log::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    log::info!("Shutdown signal received");
}
