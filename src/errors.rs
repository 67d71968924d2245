//! Error types for ragquery
//!
//! One taxonomy for every pipeline stage. Validation errors are reported to
//! the caller as-is; everything else aborts the current query only.

use thiserror::Error;

/// Main error type for the query pipeline and its service wrappers
#[derive(Error, Debug)]
pub enum QueryError {
    /// Caller supplied an unusable request (missing/empty question, bad counts)
    #[error("{0}")]
    Validation(String),

    /// Startup configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding backend failures
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector store failures
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Reranking model failures
    #[error("Reranking error: {0}")]
    Reranking(String),

    /// Language model backend reported an error
    #[error("Generation error: {0}")]
    Generation(String),

    /// Streaming transport or framing errors
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// JSON framing errors in streamed responses
    #[error("JSON parse error: {0}")]
    JsonParse(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Pipeline stage ordering violated
    #[error("Invalid stage transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// Anything else, usually bootstrap failures carried through anyhow
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// True for errors caused by the request rather than a backend
    pub fn is_validation(&self) -> bool {
        matches!(self, QueryError::Validation(_))
    }
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, QueryError>;

/// Convert anyhow errors to QueryError
impl From<anyhow::Error> for QueryError {
    fn from(err: anyhow::Error) -> Self {
        QueryError::Internal(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_is_bare() {
        let err = QueryError::Validation("Missing required field: question".to_string());
        assert_eq!(err.to_string(), "Missing required field: question");
        assert!(err.is_validation());
    }

    #[test]
    fn test_backend_errors_are_not_validation() {
        let err = QueryError::Retrieval("connection refused".to_string());
        assert!(!err.is_validation());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_timeout_display() {
        let err = QueryError::Timeout { duration_ms: 180_000 };
        assert!(err.to_string().contains("180000"));
    }

    #[test]
    fn test_anyhow_conversion_keeps_context() {
        let err: QueryError = anyhow::anyhow!("root cause").context("loading model").into();
        let text = err.to_string();
        assert!(text.contains("loading model"));
        assert!(text.contains("root cause"));
    }
}
