// Qdrant backend: cosine search over a single collection
use async_trait::async_trait;
use qdrant_client::{
    qdrant::{
        point_id::PointIdOptions, value::Kind, with_payload_selector::SelectorOptions, PointId,
        SearchPoints, Value as QdrantValue, WithPayloadSelector,
    },
    Qdrant,
};
use serde_json::{Map, Value as JsonValue};
use tracing::info;

use crate::errors::{QueryError, Result};
use crate::retrieval::engine::{SearchParams, VectorStore};
use crate::types::Document;

/// Payload keys that may hold the document text
const CONTENT_KEYS: [&str; 2] = ["content", "document"];

/// Vector store backed by a Qdrant collection
pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl QdrantStore {
    /// Connect to Qdrant at `url` (gRPC port, usually 6334)
    pub fn connect(url: &str, collection: &str) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| QueryError::Retrieval(format!("Failed to create Qdrant client: {}", e)))?;

        info!(url, collection, "Connected to Qdrant");

        Ok(Self {
            client,
            collection: collection.to_string(),
        })
    }

    /// Collection searched by this store
    pub fn collection(&self) -> &str {
        &self.collection
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn query(&self, query_vector: &[f32], params: &SearchParams) -> Result<Vec<Document>> {
        let search_result = self
            .client
            .search_points(SearchPoints {
                collection_name: self.collection.clone(),
                vector: query_vector.to_vec(),
                limit: params.match_count as u64,
                with_payload: Some(WithPayloadSelector {
                    selector_options: Some(SelectorOptions::Enable(true)),
                }),
                score_threshold: Some(params.match_threshold as f32),
                ..Default::default()
            })
            .await
            .map_err(|e| QueryError::Retrieval(format!("Failed to search points: {}", e)))?;

        let documents = search_result
            .result
            .into_iter()
            .map(|point| {
                let mut payload = point.payload;
                let content = CONTENT_KEYS
                    .iter()
                    .find_map(|key| payload.remove(*key).and_then(|v| qdrant_value_to_string(&v)));

                let metadata: Map<String, JsonValue> = payload
                    .iter()
                    .filter_map(|(key, value)| {
                        qdrant_to_json_value(value).map(|json| (key.clone(), json))
                    })
                    .collect();

                Document {
                    id: point_id_to_string(&point.id),
                    content,
                    similarity: widen_score(point.score, params.match_threshold),
                    rerank_score: None,
                    metadata,
                }
            })
            .collect();

        Ok(documents)
    }

    fn name(&self) -> &str {
        "qdrant"
    }
}

/// Qdrant filters on `score_threshold` in f32. A score that passed there may
/// widen to an f64 just under the f64 threshold; such scores are lifted to it.
fn widen_score(score: f32, threshold: f64) -> f64 {
    let similarity = f64::from(score);
    if similarity < threshold && score >= threshold as f32 {
        threshold
    } else {
        similarity
    }
}

fn qdrant_to_json_value(value: &QdrantValue) -> Option<JsonValue> {
    value.kind.as_ref().and_then(|kind| match kind {
        Kind::StringValue(s) => Some(JsonValue::String(s.clone())),
        Kind::IntegerValue(i) => Some(JsonValue::Number((*i).into())),
        Kind::DoubleValue(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number),
        Kind::BoolValue(b) => Some(JsonValue::Bool(*b)),
        _ => None,
    })
}

fn qdrant_value_to_string(value: &QdrantValue) -> Option<String> {
    match value.kind.as_ref() {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn point_id_to_string(point_id: &Option<PointId>) -> String {
    match point_id.as_ref().and_then(|id| id.point_id_options.as_ref()) {
        Some(PointIdOptions::Num(n)) => n.to_string(),
        Some(PointIdOptions::Uuid(u)) => u.clone(),
        None => "unknown".to_string(),
    }
}
