//! Retrieved documents and the candidate set helpers

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A document returned by the vector store.
///
/// `similarity` is set once by the retriever and never rewritten.
/// `rerank_score` is only present when the reranking stage ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub content: Option<String>,
    pub similarity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Create a document with no metadata and no rerank score
    pub fn new(id: impl Into<String>, content: Option<String>, similarity: f64) -> Self {
        Self {
            id: id.into(),
            content,
            similarity,
            rerank_score: None,
            metadata: Map::new(),
        }
    }

    /// Content that can contribute to a prompt, if any
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }
}
