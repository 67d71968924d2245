//! Answer generation
//!
//! Provides the Ollama completion client, the incremental NDJSON parser used
//! to decode its streamed output, prompt assembly and the `Answerer`.

pub mod answerer;
pub mod client;
pub mod context;
pub mod parser;

pub use answerer::{Answerer, FragmentTrimmer};
pub use client::{OllamaClient, DEFAULT_MODEL, DEFAULT_OLLAMA_URL};
pub use context::{AssembledContext, ContextBuilder, NO_CONTEXT};
pub use parser::{JsonParser, MAX_BUFFER_SIZE};

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::errors::Result;

/// Finite, ordered, non-restartable sequence of answer fragments
pub type FragmentStream = BoxStream<'static, Result<String>>;

/// Text-completion capability of a language-model backend
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Complete `prompt` in one response
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Complete `prompt` as fragments in generation order
    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream>;

    /// Model identifier
    fn model(&self) -> &str;
}
