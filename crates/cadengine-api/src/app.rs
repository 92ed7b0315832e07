//! Application builder and server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use cadengine_converter::{ConversionKernel, ConversionPipeline, ProcessKernel, TempStorage};
use cadengine_core::config::AppConfig;
use cadengine_core::error::{AppError, ErrorKind};
use cadengine_core::result::AppResult;

use crate::middleware::rate_limit::RateLimiter;
use crate::router::build_router;
use crate::state::AppState;

/// How often idle clients are dropped from the rate limiter.
const LIMITER_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    build_router(state)
}

/// Open temp storage, wire the pipeline to the configured kernel, and build
/// the shared state.
pub async fn build_state(config: AppConfig) -> AppResult<AppState> {
    let storage = TempStorage::open(&config.storage.temp_dir)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Storage,
                format!(
                    "Failed to create temp dir '{}'",
                    config.storage.temp_dir.display()
                ),
                e,
            )
        })?;

    match storage
        .sweep_stale(Duration::from_secs(config.storage.stale_after_seconds))
        .await
    {
        Ok(removed) => tracing::debug!(removed, "Temp sweep complete"),
        Err(e) => tracing::warn!(error = %e, "Temp sweep failed"),
    }

    let kernel: Arc<dyn ConversionKernel> = Arc::new(ProcessKernel::from_config(&config.kernel));
    if !kernel.is_available().await {
        tracing::warn!(
            engine = kernel.name(),
            command = %config.kernel.command,
            "Geometry kernel not found; conversions will fail until it is installed"
        );
    }

    let pipeline = ConversionPipeline::new(storage, kernel, &config);
    Ok(AppState::new(config, pipeline))
}

/// Runs the CAD Engine server until Ctrl+C (or SIGTERM on Unix).
///
/// In-flight requests get `server.shutdown_grace_seconds` to finish; any
/// still running after that are aborted, which releases their temp files.
pub async fn run_server(config: AppConfig) -> AppResult<()> {
    tracing::info!("Starting CAD Engine server...");

    let addr = config.server.bind_address();
    let grace = Duration::from_secs(config.server.shutdown_grace_seconds);
    let state = build_state(config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let prune_task = spawn_limiter_pruner(state.limiter.clone(), shutdown_rx.clone());

    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Internal, format!("Failed to bind {addr}"), e))?;

    tracing::info!("CAD Engine listening on {}", addr);

    let mut server_shutdown = shutdown_rx;
    let mut server: JoinHandle<std::io::Result<()>> = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.changed().await;
        })
        .await
    });

    let result = tokio::select! {
        joined = &mut server => joined,
        _ = shutdown_signal() => {
            tracing::info!(grace_secs = grace.as_secs(), "Shutdown signal received, draining requests");
            let _ = shutdown_tx.send(true);
            match tokio::time::timeout(grace, &mut server).await {
                Ok(joined) => joined,
                Err(_) => {
                    tracing::warn!("Grace period elapsed, aborting in-flight requests");
                    server.abort();
                    Ok(Ok(()))
                }
            }
        }
    };

    let _ = shutdown_tx.send(true);
    let _ = prune_task.await;

    match result {
        Ok(Ok(())) => {
            tracing::info!("CAD Engine stopped");
            Ok(())
        }
        Ok(Err(e)) => Err(AppError::with_source(ErrorKind::Internal, "Server error", e)),
        Err(e) => Err(AppError::with_source(ErrorKind::Internal, "Server task failed", e)),
    }
}

/// Periodically drop idle clients from the limiter until shutdown.
fn spawn_limiter_pruner(limiter: RateLimiter, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(LIMITER_PRUNE_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.prune();
                    if removed > 0 {
                        tracing::debug!(removed, "Pruned idle rate-limit clients");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
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
}
