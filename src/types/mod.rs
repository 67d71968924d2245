//! Core data model shared by the pipeline, the HTTP layer and the CLI.

pub mod document;
pub mod events;
pub mod query;

pub use document::Document;
pub use events::{StreamEvent, StreamTranscript};
pub use query::{
    Query, QueryMetadata, QueryRequest, QueryResult, NO_INFORMATION_ANSWER, NO_MATCHES_MESSAGE,
};

/// Unit-length embedding vector
pub type EmbeddingVector = Vec<f32>;
