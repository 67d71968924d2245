//! HTTP surface of the query service

pub mod error;
pub mod routes;

pub use error::ApiError;
pub use routes::{create_router, AppState, SERVICE_NAME};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::info;

/// Bind `host:port` and serve until the process is stopped
pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!(
        %addr,
        environment = ?state.config.server.environment,
        reranking = state.pipeline.reranking_enabled(),
        "Query service listening"
    );

    axum::serve(listener, create_router(state))
        .await
        .context("Server error")?;

    Ok(())
}
