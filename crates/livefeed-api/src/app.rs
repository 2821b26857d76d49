//! Axum app assembly, listener and graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware as axum_middleware;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use livefeed_core::config::AppConfig;
use livefeed_core::error::AppError;
use livefeed_realtime::RealtimeEngine;

use crate::middleware::cors::build_cors_layer;
use crate::middleware::logging::request_logging;
use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application with all routes and middleware.
pub fn build_app(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.server.cors);
    build_router(state)
        .layer(axum_middleware::from_fn(request_logging))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Serves the app on `listener` until the engine begins shutting down.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<(), AppError> {
    let shutdown = state.realtime.shutdown_token();
    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))
}

/// Runs the LiveFeed server with the given configuration.
pub async fn run_server(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting LiveFeed server...");

    // ── Step 1: Initialize realtime engine ───────────────────────
    let engine = Arc::new(RealtimeEngine::new(config.realtime.clone(), &config.auth));
    engine.start()?;

    // ── Step 2: Bind listener ────────────────────────────────────
    let addr = config.server.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("LiveFeed server listening on {}", addr);

    // ── Step 3: Serve until a signal arrives ─────────────────────
    let state = AppState::with_engine(config, Arc::clone(&engine));
    let signal_engine = Arc::clone(&engine);
    let grace = Duration::from_secs(state.config.server.shutdown_grace_seconds);
    tokio::spawn(async move {
        shutdown_signal().await;
        match tokio::time::timeout(grace, signal_engine.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Engine shutdown failed"),
            Err(_) => tracing::warn!(grace = ?grace, "Engine shutdown exceeded grace period"),
        }
    });

    serve(listener, state).await?;

    tracing::info!("LiveFeed server stopped");
    Ok(())
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
