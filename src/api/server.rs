use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::{
    services::{
        cancel_job, download_file, get_job, get_logs, get_progress, health, list_formats,
        stream_events, submit_download,
    },
    state::AppState,
};
use crate::config::Config;
use crate::engines::Engines;
use crate::registry::spawn_sweeper;
use crate::storage::StorageClient;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Build the HTTP router over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download", post(submit_download))
        .route("/download/{key}", get(get_job))
        .route("/download/{key}/events", get(stream_events))
        .route("/download/{key}/progress", get(get_progress))
        .route("/download/{key}/logs", get(get_logs))
        .route("/download/{key}/cancel", post(cancel_job))
        .route("/formats", get(list_formats))
        .route("/files/{filename}", get(download_file))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(RequestDecompressionLayer::new())
}

pub async fn run(config: Config, address: SocketAddr) -> Result<(), AnyError> {
    let storage = StorageClient::local(&config.server.output_dir)
        .map_err(|e| format!("Failed to open output directory: {}", e))?;
    let engines = Engines::from_config(&config);

    let ttl = config.jobs.eviction_ttl();
    let sweep_interval = config.jobs.sweep_interval();
    let state = AppState::new(config, engines, storage);

    let shutdown = CancellationToken::new();
    let sweeper = spawn_sweeper(
        state.registry.clone(),
        state.metrics.clone(),
        ttl,
        sweep_interval,
        shutdown.clone(),
    );

    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "Mediabox API listening");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        error!(error = %e, "Eviction sweeper did not stop cleanly");
    }

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}
