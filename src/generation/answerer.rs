// Grounded answer generation, blocking and streamed
use futures_util::{future, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

use crate::errors::Result;
use crate::generation::context::ContextBuilder;
use crate::generation::{FragmentStream, GenerationBackend};
use crate::types::Document;

/// Answerer wraps a language-model backend with the prompting policy.
///
/// The streamed fragments of `answer_stream` concatenate to exactly what
/// `answer` returns for the same inputs: both are whitespace-trimmed.
#[derive(Clone)]
pub struct Answerer {
    backend: Arc<dyn GenerationBackend>,
    context_builder: ContextBuilder,
}

impl Answerer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            context_builder: ContextBuilder::new(),
        }
    }

    /// Generate the complete answer
    pub async fn answer(&self, question: &str, documents: &[Document]) -> Result<String> {
        let prompt = self.context_builder.prompt(question, documents);
        debug!(model = self.backend.model(), prompt_len = prompt.len(), "Generating answer");

        let answer = self.backend.complete(&prompt).await?;

        info!(model = self.backend.model(), answer_len = answer.len(), "Answer generated");
        Ok(answer.trim().to_string())
    }

    /// Generate the answer as ordered, non-empty fragments
    pub async fn answer_stream(
        &self,
        question: &str,
        documents: &[Document],
    ) -> Result<FragmentStream> {
        let prompt = self.context_builder.prompt(question, documents);
        debug!(model = self.backend.model(), prompt_len = prompt.len(), "Streaming answer");

        let fragments = self.backend.complete_stream(&prompt).await?;
        let mut trimmer = FragmentTrimmer::new();

        Ok(fragments
            .filter_map(move |item| {
                let out = match item {
                    Ok(fragment) => trimmer.push(&fragment).map(Ok),
                    Err(err) => Some(Err(err)),
                };
                future::ready(out)
            })
            .boxed())
    }

    /// Model used by the backend
    pub fn model(&self) -> &str {
        self.backend.model()
    }
}

/// Streaming equivalent of `str::trim`.
///
/// Drops whitespace before the first visible character and holds back
/// trailing whitespace until more visible text arrives, so whitespace at the
/// very end is never emitted.
#[derive(Debug, Default)]
pub struct FragmentTrimmer {
    started: bool,
    pending: String,
}

impl FragmentTrimmer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text to forward for `fragment`, or None if nothing should be emitted yet
    pub fn push(&mut self, fragment: &str) -> Option<String> {
        let fragment = if self.started {
            fragment
        } else {
            fragment.trim_start()
        };
        if fragment.is_empty() {
            return None;
        }

        let body = fragment.trim_end();
        if body.is_empty() {
            self.pending.push_str(fragment);
            return None;
        }

        self.started = true;
        let mut out = std::mem::take(&mut self.pending);
        out.push_str(body);
        self.pending.push_str(&fragment[body.len()..]);

        Some(out)
    }
}
