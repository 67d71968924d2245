// Retrieval engine: nearest neighbours by cosine similarity
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

use crate::errors::Result;
use crate::types::Document;

/// Search parameters for retrieval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Maximum number of results to retrieve
    pub match_count: usize,
    /// Minimum similarity, inclusive (0.0 to 1.0)
    pub match_threshold: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            match_count: 3,
            match_threshold: 0.7,
        }
    }
}

/// Raw vector-store backend
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Rows nearest to `query_vector`. Backends are expected, not trusted,
    /// to honour `params`.
    async fn query(&self, query_vector: &[f32], params: &SearchParams) -> Result<Vec<Document>>;

    /// Short backend name for logs
    fn name(&self) -> &str;
}

/// Retrieval engine for semantic search.
///
/// Whatever the backend returns, results are above the threshold, ordered by
/// descending similarity (ties keep backend order) and at most `match_count` long.
#[derive(Clone)]
pub struct RetrievalEngine {
    store: Arc<dyn VectorStore>,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }

    /// Retrieve documents similar to `query_vector`. An empty result is not an error.
    pub async fn search(
        &self,
        query_vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<Document>> {
        let rows = self.store.query(query_vector, params).await?;
        let returned = rows.len();

        let mut documents: Vec<Document> = rows
            .into_iter()
            .filter(|doc| doc.similarity >= params.match_threshold)
            .collect();

        documents.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        documents.truncate(params.match_count);

        if documents.len() < returned {
            debug!(
                backend = self.store.name(),
                returned,
                kept = documents.len(),
                "Dropped rows outside search parameters"
            );
        }

        Ok(documents)
    }

    /// Backend name
    pub fn backend(&self) -> &str {
        self.store.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::QueryError;

    struct FixedStore {
        rows: Vec<Document>,
    }

    #[async_trait]
    impl VectorStore for FixedStore {
        async fn query(&self, _: &[f32], _: &SearchParams) -> Result<Vec<Document>> {
            Ok(self.rows.clone())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct DownStore;

    #[async_trait]
    impl VectorStore for DownStore {
        async fn query(&self, _: &[f32], _: &SearchParams) -> Result<Vec<Document>> {
            Err(QueryError::Retrieval("connection refused".to_string()))
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    fn doc(id: &str, similarity: f64) -> Document {
        Document::new(id, Some(format!("content {id}")), similarity)
    }

    fn engine(rows: Vec<Document>) -> RetrievalEngine {
        RetrievalEngine::new(Arc::new(FixedStore { rows }))
    }

    #[test]
    fn test_search_params_default() {
        let params = SearchParams::default();
        assert_eq!(params.match_count, 3);
        assert_eq!(params.match_threshold, 0.7);
    }

    #[tokio::test]
    async fn test_search_enforces_threshold_order_and_count() {
        let engine = engine(vec![
            doc("low", 0.5),
            doc("b", 0.8),
            doc("a", 0.95),
            doc("c", 0.7),
            doc("d", 0.75),
        ]);
        let params = SearchParams {
            match_count: 3,
            match_threshold: 0.7,
        };

        let results = engine.search(&[1.0], &params).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert!(results.iter().all(|d| d.similarity >= params.match_threshold));
        assert!(results.len() <= params.match_count);
    }

    #[tokio::test]
    async fn test_search_threshold_is_strict_below_and_inclusive_at() {
        let engine = engine(vec![doc("under", 0.69999999), doc("at", 0.7)]);
        let params = SearchParams {
            match_count: 10,
            match_threshold: 0.7,
        };

        let results = engine.search(&[1.0], &params).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["at"]);
        assert!(results.iter().all(|d| d.similarity >= 0.7));
    }

    #[tokio::test]
    async fn test_search_ties_keep_backend_order() {
        let engine = engine(vec![doc("first", 0.8), doc("second", 0.8), doc("third", 0.9)]);
        let params = SearchParams {
            match_count: 10,
            match_threshold: 0.0,
        };
        let results = engine.search(&[1.0], &params).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["third", "first", "second"]);
    }

    #[tokio::test]
    async fn test_search_empty_is_ok() {
        let results = engine(Vec::new())
            .search(&[1.0], &SearchParams::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let engine = RetrievalEngine::new(Arc::new(DownStore));
        let err = engine
            .search(&[1.0], &SearchParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Retrieval(_)));
    }
}
