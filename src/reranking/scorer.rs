// Re-ranking of retrieved candidates by (question, document) relevance
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::errors::{QueryError, Result};
use crate::types::Document;

/// Black-box relevance judgment for (question, document) pairs.
///
/// Scores must be deterministic for a fixed pair, and higher means more relevant.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    /// One score per entry of `contents`, in the same order
    async fn score(&self, question: &str, contents: &[&str]) -> Result<Vec<f32>>;

    /// Short scorer name for logs
    fn name(&self) -> &str;
}

/// Re-ranker for improving retrieval results.
///
/// Attaches `rerank_score`, sorts by it descending and keeps the first `top_k`.
/// Never touches `id`, `content` or `similarity`.
#[derive(Clone)]
pub struct ReRanker {
    scorer: Arc<dyn RelevanceScorer>,
}

impl ReRanker {
    pub fn new(scorer: Arc<dyn RelevanceScorer>) -> Self {
        Self { scorer }
    }

    /// Re-rank documents for `question`
    pub async fn rerank(
        &self,
        question: &str,
        documents: Vec<Document>,
        top_k: usize,
    ) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            scorer = self.scorer.name(),
            candidates = documents.len(),
            "Reranking documents"
        );

        // Missing content is scored as empty text
        let contents: Vec<&str> = documents
            .iter()
            .map(|doc| doc.content.as_deref().unwrap_or(""))
            .collect();

        let scores = self.scorer.score(question, &contents).await?;
        if scores.len() != documents.len() {
            return Err(QueryError::Reranking(format!(
                "scorer returned {} scores for {} documents",
                scores.len(),
                documents.len()
            )));
        }
        if let Some(position) = scores.iter().position(|score| !score.is_finite()) {
            return Err(QueryError::Reranking(format!(
                "scorer returned non-finite score {} for document {}",
                scores[position], documents[position].id
            )));
        }

        let mut ranked: Vec<Document> = documents
            .into_iter()
            .zip(scores)
            .map(|(mut doc, score)| {
                doc.rerank_score = Some(score);
                doc
            })
            .collect();

        // Sort by rerank score descending; ties keep retrieval order
        ranked.sort_by(|a, b| {
            let score = |doc: &Document| doc.rerank_score.unwrap_or_default();
            score(b).total_cmp(&score(a))
        });
        ranked.truncate(top_k);

        if let (Some(top), Some(lowest)) = (ranked.first(), ranked.last()) {
            info!(
                kept = ranked.len(),
                top_score = top.rerank_score.unwrap_or_default(),
                lowest_score = lowest.rerank_score.unwrap_or_default(),
                "Reranked documents"
            );
        }

        Ok(ranked)
    }

    /// Scorer name
    pub fn scorer_name(&self) -> &str {
        self.scorer.name()
    }
}

/// Lexical scorer: share of significant question words found in the document.
///
/// Words of three characters or fewer are ignored. Scores lie in [0, 1].
#[derive(Debug, Clone, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one document
    pub fn keyword_score(question: &str, content: &str) -> f32 {
        let question_lower = question.to_lowercase();
        let terms: HashSet<&str> = question_lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.len() > 3)
            .collect();

        if terms.is_empty() {
            return 0.0;
        }

        let content_lower = content.to_lowercase();
        let matches = terms
            .iter()
            .filter(|term| content_lower.contains(*term))
            .count();

        matches as f32 / terms.len() as f32
    }
}

#[async_trait]
impl RelevanceScorer for KeywordScorer {
    async fn score(&self, question: &str, contents: &[&str]) -> Result<Vec<f32>> {
        Ok(contents
            .iter()
            .map(|content| Self::keyword_score(question, content))
            .collect())
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scores documents by a number embedded in their content
    struct ScriptedScorer;

    #[async_trait]
    impl RelevanceScorer for ScriptedScorer {
        async fn score(&self, _question: &str, contents: &[&str]) -> Result<Vec<f32>> {
            Ok(contents
                .iter()
                .map(|c| c.parse::<f32>().unwrap_or(0.0))
                .collect())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct ShortScorer;

    #[async_trait]
    impl RelevanceScorer for ShortScorer {
        async fn score(&self, _question: &str, _contents: &[&str]) -> Result<Vec<f32>> {
            Ok(vec![0.5])
        }

        fn name(&self) -> &str {
            "short"
        }
    }

    /// Every third document scores NaN
    struct NanScorer;

    #[async_trait]
    impl RelevanceScorer for NanScorer {
        async fn score(&self, _question: &str, contents: &[&str]) -> Result<Vec<f32>> {
            Ok((0..contents.len())
                .map(|i| if i % 3 == 0 { f32::NAN } else { i as f32 })
                .collect())
        }

        fn name(&self) -> &str {
            "nan"
        }
    }

    fn create_test_doc(id: &str, content: Option<&str>, similarity: f64) -> Document {
        Document::new(id, content.map(str::to_string), similarity)
    }

    fn ten_candidates() -> Vec<Document> {
        (0..10)
            .map(|i| {
                let score = ((i * 7) % 10) as f32 / 10.0;
                let content = score.to_string();
                create_test_doc(&format!("doc{i}"), Some(&content), 0.9 - i as f64 * 0.01)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_rerank_narrows_and_sorts() {
        let ranker = ReRanker::new(Arc::new(ScriptedScorer));
        let ranked = ranker.rerank("q", ten_candidates(), 3).await.unwrap();

        assert_eq!(ranked.len(), 3);
        let scores: Vec<f32> = ranked.iter().map(|d| d.rerank_score.unwrap()).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(scores[0], 0.9);
    }

    #[tokio::test]
    async fn test_rerank_preserves_identity_fields() {
        let ranker = ReRanker::new(Arc::new(ScriptedScorer));
        let input = ten_candidates();
        let ranked = ranker.rerank("q", input.clone(), 10).await.unwrap();

        for doc in &ranked {
            let original = input.iter().find(|d| d.id == doc.id).unwrap();
            assert_eq!(doc.content, original.content);
            assert_eq!(doc.similarity, original.similarity);
            assert!(doc.rerank_score.is_some());
        }
    }

    #[tokio::test]
    async fn test_top_k_larger_than_input_returns_all() {
        let ranker = ReRanker::new(Arc::new(ScriptedScorer));
        let docs = vec![
            create_test_doc("1", Some("0.2"), 0.8),
            create_test_doc("2", Some("0.6"), 0.7),
        ];
        let ranked = ranker.rerank("q", docs, 5).await.unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].id, "2");
    }

    #[tokio::test]
    async fn test_missing_content_still_scored() {
        let ranker = ReRanker::new(Arc::new(KeywordScorer::new()));
        let docs = vec![
            create_test_doc("empty", None, 0.9),
            create_test_doc("match", Some("Reset your password from settings"), 0.8),
        ];
        let ranked = ranker.rerank("How to reset password", docs, 2).await.unwrap();
        assert_eq!(ranked[0].id, "match");
        assert_eq!(ranked[1].id, "empty");
        assert_eq!(ranked[1].rerank_score, Some(0.0));
    }

    #[tokio::test]
    async fn test_empty_input_skips_scorer() {
        let ranker = ReRanker::new(Arc::new(ShortScorer));
        assert!(ranker.rerank("q", Vec::new(), 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_score_count_mismatch_is_error() {
        let ranker = ReRanker::new(Arc::new(ShortScorer));
        let docs = vec![
            create_test_doc("1", Some("a"), 0.9),
            create_test_doc("2", Some("b"), 0.8),
        ];
        let err = ranker.rerank("q", docs, 2).await.unwrap_err();
        assert!(matches!(err, QueryError::Reranking(_)));
    }

    #[tokio::test]
    async fn test_non_finite_score_is_error() {
        let ranker = ReRanker::new(Arc::new(NanScorer));
        let docs: Vec<Document> = (0..60)
            .map(|i| create_test_doc(&format!("doc{i}"), Some("text"), 0.9))
            .collect();

        let err = ranker.rerank("q", docs, 60).await.unwrap_err();
        assert!(matches!(err, QueryError::Reranking(_)));
        assert!(err.to_string().contains("doc0"));
    }

    #[test]
    fn test_keyword_score() {
        let score = KeywordScorer::keyword_score("rust programming", "rust programming language");
        assert_eq!(score, 1.0);

        let partial = KeywordScorer::keyword_score("rust programming", "a language named rust");
        assert_eq!(partial, 0.5);

        assert_eq!(KeywordScorer::keyword_score("a an the", "anything"), 0.0);
        assert_eq!(KeywordScorer::keyword_score("password reset", ""), 0.0);
    }

    #[test]
    fn test_keyword_score_is_deterministic() {
        let question = "VPN connection drops";
        let content = "The VPN connection drops hourly";
        let a = KeywordScorer::keyword_score(question, content);
        let b = KeywordScorer::keyword_score(question, content);
        assert_eq!(a, b);
    }
}
