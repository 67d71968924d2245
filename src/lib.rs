//! ragquery - retrieval-augmented question answering
//!
//! A question is embedded, matched against a vector store, optionally
//! reranked, and answered by a language model grounded in the matches.
//!
//! # Architecture
//!
//! - **embedding**: sentence embeddings (candle BERT)
//! - **retrieval**: similarity search over Supabase/pgvector or Qdrant
//! - **reranking**: cross-encoder or keyword rescoring
//! - **generation**: prompt assembly and Ollama completion, blocking or streamed
//! - **pipeline**: per-query orchestration and stage tracking
//! - **server**: axum HTTP + SSE surface

pub mod errors;
pub mod types;

pub use errors::{QueryError, Result};

pub mod embedding;
pub mod generation;
pub mod reranking;
pub mod retrieval;

pub mod pipeline;
pub use pipeline::{PipelineServices, QueryPipeline, RetrievalPolicy};

pub mod cli;
pub mod config;
pub mod server;
