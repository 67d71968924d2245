//! Incoming query requests and the externally visible query result

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};
use crate::types::Document;

/// Answer returned when nothing relevant was retrieved
pub const NO_INFORMATION_ANSWER: &str =
    "I couldn't find any relevant information to answer your question.";

/// Message attached to the empty-result response
pub const NO_MATCHES_MESSAGE: &str = "No matching documents found";

/// Request body accepted by both query endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub match_count: Option<usize>,
    #[serde(default)]
    pub match_threshold: Option<f64>,
}

impl QueryRequest {
    /// Validate the request, filling absent parameters from defaults
    pub fn into_query(self, default_count: usize, default_threshold: f64) -> Result<Query> {
        let question = self.question.ok_or_else(|| {
            QueryError::Validation("Missing required field: question".to_string())
        })?;

        Query::new(
            &question,
            self.match_count.unwrap_or(default_count),
            self.match_threshold.unwrap_or(default_threshold),
        )
    }
}

/// A validated query, immutable for the lifetime of one request
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    text: String,
    match_count: usize,
    match_threshold: f64,
}

impl Query {
    /// Validate and build a query. The question is trimmed.
    pub fn new(text: &str, match_count: usize, match_threshold: f64) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(QueryError::Validation("Question cannot be empty".to_string()));
        }
        if match_count == 0 {
            return Err(QueryError::Validation(
                "match_count must be a positive integer".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&match_threshold) {
            return Err(QueryError::Validation(format!(
                "match_threshold must be between 0 and 1, got {}",
                match_threshold
            )));
        }

        Ok(Self {
            text: text.to_string(),
            match_count,
            match_threshold,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn match_count(&self) -> usize {
        self.match_count
    }

    pub fn match_threshold(&self) -> f64 {
        self.match_threshold
    }
}

/// Metadata block of a query result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub question: String,
    pub num_sources: usize,
    pub match_threshold: f64,
}

/// Outcome of one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub success: bool,
    pub answer: String,
    pub sources: Vec<Document>,
    pub metadata: QueryMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl QueryResult {
    /// Successful answer grounded in `sources`
    pub fn answered(query: &Query, answer: String, sources: Vec<Document>) -> Self {
        Self {
            success: true,
            answer,
            metadata: QueryMetadata {
                question: query.text().to_string(),
                num_sources: sources.len(),
                match_threshold: query.match_threshold(),
            },
            sources,
            message: None,
        }
    }

    /// Successful outcome when retrieval found nothing
    pub fn no_matches(query: &Query) -> Self {
        Self {
            message: Some(NO_MATCHES_MESSAGE.to_string()),
            ..Self::answered(query, NO_INFORMATION_ANSWER.to_string(), Vec::new())
        }
    }

    /// True when the answerer was skipped because nothing matched
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_question_is_rejected() {
        let err = QueryRequest::default().into_query(3, 0.7).unwrap_err();
        assert!(err.is_validation());
        assert!(err.to_string().contains("question"));
    }

    #[test]
    fn test_blank_question_is_rejected() {
        let err = Query::new("   \n", 3, 0.7).unwrap_err();
        assert_eq!(err.to_string(), "Question cannot be empty");
    }

    #[test]
    fn test_defaults_fill_absent_parameters() {
        let request = QueryRequest {
            question: Some("  How do I reset my password?  ".to_string()),
            ..Default::default()
        };
        let query = request.into_query(5, 0.6).unwrap();
        assert_eq!(query.text(), "How do I reset my password?");
        assert_eq!(query.match_count(), 5);
        assert_eq!(query.match_threshold(), 0.6);
    }

    #[test]
    fn test_out_of_range_parameters_are_rejected() {
        assert!(Query::new("q", 0, 0.7).unwrap_err().is_validation());
        assert!(Query::new("q", 3, 1.5).unwrap_err().is_validation());
        assert!(Query::new("q", 3, -0.1).unwrap_err().is_validation());
        assert!(Query::new("q", 1, 0.0).is_ok());
        assert!(Query::new("q", 1, 1.0).is_ok());
    }

    #[test]
    fn test_no_matches_shape() {
        let query = Query::new("What is the capital of Mars?", 3, 0.7).unwrap();
        let result = QueryResult::no_matches(&query);
        assert!(result.success);
        assert_eq!(result.answer, NO_INFORMATION_ANSWER);
        assert!(result.sources.is_empty());
        assert_eq!(result.metadata.num_sources, 0);
        assert_eq!(result.message.as_deref(), Some(NO_MATCHES_MESSAGE));
    }

    #[test]
    fn test_answered_counts_sources() {
        let query = Query::new("q", 3, 0.5).unwrap();
        let sources = vec![
            Document::new("1", Some("a".into()), 0.9),
            Document::new("2", Some("b".into()), 0.8),
        ];
        let result = QueryResult::answered(&query, "answer".into(), sources);
        assert_eq!(result.metadata.num_sources, 2);
        assert_eq!(result.metadata.match_threshold, 0.5);

        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("message").is_none());
    }
}
