use anyhow::{Context, Result};
use axum::{middleware, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::api_routes::make_api_routes;
use super::batch_routes::make_batch_routes;
use super::state::{ApiState, BatchState};
use super::{log_requests, recover_panics};

pub fn make_api_app(state: ApiState) -> Router {
    let logging_level = state.config.requests_logging_level.clone();
    let boundary = state.boundary.clone();

    make_api_routes(state)
        .layer(middleware::from_fn_with_state(boundary, recover_panics))
        .layer(middleware::from_fn_with_state(logging_level, log_requests))
}

pub fn make_batch_app(state: BatchState) -> Router {
    let logging_level = state.config.requests_logging_level.clone();
    let boundary = state.boundary.clone();

    make_batch_routes(state)
        .layer(middleware::from_fn_with_state(boundary, recover_panics))
        .layer(middleware::from_fn_with_state(logging_level, log_requests))
}

pub async fn run_api_server(state: ApiState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    serve(make_api_app(state), port, "API", shutdown).await
}

pub async fn run_batch_server(state: BatchState, shutdown: CancellationToken) -> Result<()> {
    let port = state.config.port;
    serve(make_batch_app(state), port, "batch", shutdown).await
}

async fn serve(app: Router, port: u16, name: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .with_context(|| format!("Failed to bind {} server to port {}", name, port))?;
    info!("{} server listening on port {}", name, port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .with_context(|| format!("{} server failed", name))?;

    info!("{} server stopped", name);
    Ok(())
}
