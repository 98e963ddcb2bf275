// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use axum::{routing::get, Router};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::infrastructure::config::load_reporter_config;
use crate::infrastructure::latex::LatexCompiler;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{health_check, v4_report, v5_report};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Load configuration
    let config = load_reporter_config()?;
    let addr: SocketAddr = config.server.listen.parse()?;

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState {
        compiler: LatexCompiler::new(config.report.latex_program.clone()),
        config,
        shutdown: shutdown.clone(),
    });

    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/api/report/:dashboard", get(v4_report))
        .route("/api/v5/report/:dashboard", get(v5_report))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("Starting dashboard-reporter on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down, cancelling in-flight reports");
            shutdown.cancel();
        })
        .await?;

    Ok(())
}
