//! Supabase (pgvector) backend
//!
//! Calls a Postgres similarity function through PostgREST:
//! `POST {url}/rest/v1/rpc/{function}` with the query embedding, count and
//! threshold, and maps each returned row to a `Document`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::errors::{QueryError, Result};
use crate::retrieval::engine::{SearchParams, VectorStore};
use crate::types::Document;

/// Request timeout for similarity search
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgREST RPC client for the similarity-search function
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    rpc_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct MatchRequest<'a> {
    query_embedding: &'a [f32],
    match_count: usize,
    match_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct MatchRow {
    id: Value,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    similarity: f64,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<MatchRow> for Document {
    fn from(row: MatchRow) -> Self {
        let id = match row.id {
            Value::String(s) => s,
            other => other.to_string(),
        };

        Self {
            id,
            content: row.content,
            similarity: row.similarity,
            rerank_score: None,
            metadata: row.extra,
        }
    }
}

impl SupabaseStore {
    /// Create a client for `function` on the project at `base_url`
    pub fn new(base_url: &str, api_key: &str, function: &str) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self {
            client,
            rpc_url: format!("{}/rest/v1/rpc/{}", base_url.trim_end_matches('/'), function),
            api_key: api_key.to_string(),
        })
    }

    /// Full RPC endpoint URL
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn query(&self, query_vector: &[f32], params: &SearchParams) -> Result<Vec<Document>> {
        let request = MatchRequest {
            query_embedding: query_vector,
            match_count: params.match_count,
            match_threshold: params.match_threshold,
        };

        let response = self
            .client
            .post(&self.rpc_url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Retrieval(format!("Failed to send request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(QueryError::Retrieval(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        // PostgREST answers `null` for functions returning no rows
        let rows: Option<Vec<MatchRow>> = response
            .json()
            .await
            .map_err(|e| QueryError::Retrieval(format!("Failed to parse rows: {}", e)))?;

        Ok(rows
            .unwrap_or_default()
            .into_iter()
            .map(Document::from)
            .collect())
    }

    fn name(&self) -> &str {
        "supabase"
    }
}
