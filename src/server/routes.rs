//! HTTP routes
//!
//! - `POST /api/query`: blocking query, JSON result
//! - `POST /api/query/stream`: same request, answered as server-sent events
//! - `POST /api/embedding`: embed arbitrary text
//! - `GET /health`: liveness

use axum::{
    body::Bytes,
    extract::State,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use chrono::Utc;
use futures_util::StreamExt;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::pipeline::QueryPipeline;
use crate::server::error::ApiError;
use crate::types::{EmbeddingVector, Query, QueryRequest, QueryResult};

/// Name reported by the health endpoint
pub const SERVICE_NAME: &str = "IT Knowledge Retrieval Service";

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub pipeline: QueryPipeline,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pipeline: QueryPipeline, config: Config) -> Self {
        Self {
            pipeline,
            config: Arc::new(config),
        }
    }

    fn expose_details(&self) -> bool {
        self.config.server.is_development()
    }

    /// Validate a query request against the configured defaults
    fn query_from(&self, body: &Bytes) -> Result<Query, ApiError> {
        let request: QueryRequest = parse_body(body)?;
        let defaults = &self.config.retrieval;

        request
            .into_query(defaults.match_count, defaults.match_threshold)
            .map_err(|e| ApiError::from_query_error(e, self.expose_details()))
    }
}

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/query", post(query))
        .route("/api/query/stream", post(query_stream))
        .route("/api/embedding", post(embedding))
        .fallback(not_found)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

async fn query(State(state): State<AppState>, body: Bytes) -> Result<Json<QueryResult>, ApiError> {
    let query = state.query_from(&body)?;
    info!(
        question = query.text(),
        match_count = query.match_count(),
        match_threshold = query.match_threshold(),
        "Received query"
    );

    let result = state
        .pipeline
        .run(&query)
        .await
        .map_err(|e| ApiError::from_query_error(e, state.expose_details()))?;

    Ok(Json(result))
}

async fn query_stream(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let query = state.query_from(&body)?;
    info!(
        question = query.text(),
        match_count = query.match_count(),
        match_threshold = query.match_threshold(),
        "Received streaming query"
    );

    let expose_details = state.expose_details();
    let events = state.pipeline.run_stream(query).map(move |event| {
        let event = if expose_details {
            event
        } else {
            event.without_details()
        };
        Event::default().json_data(&event)
    });

    Ok(Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response())
}

#[derive(Debug, Deserialize)]
struct EmbeddingRequest {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingResponse {
    success: bool,
    embedding: EmbeddingVector,
    dimension: usize,
}

async fn embedding(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<EmbeddingResponse>, ApiError> {
    let request: EmbeddingRequest = parse_body(&body)?;
    let text = request
        .text
        .ok_or_else(|| ApiError::bad_request("Missing required field: text"))?;
    if text.trim().is_empty() {
        return Err(ApiError::bad_request("Text cannot be empty"));
    }

    let embedding = state
        .pipeline
        .embed(&text)
        .await
        .map_err(|e| ApiError::from_query_error(e, state.expose_details()))?;

    Ok(Json(EmbeddingResponse {
        success: true,
        dimension: embedding.len(),
        embedding,
    }))
}

async fn not_found() -> ApiError {
    ApiError::not_found()
}

/// Decode a JSON body; an empty body decodes as `{}`
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    let bytes: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}"
    } else {
        &body[..]
    };

    serde_json::from_slice(bytes).map_err(|e| {
        warn!(error = %e, "Rejected request body");
        ApiError::bad_request(format!("Invalid request body: {}", e))
    })
}
