// Context builder for grounded prompts
use serde::{Deserialize, Serialize};

use crate::types::Document;

/// Context used when no document contributes any text
pub const NO_CONTEXT: &str = "No relevant context found.";

/// Instructions prepended to every prompt
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant that answers questions based on the provided context.
Use the context below to answer the user's question accurately and concisely.
If the context doesn't contain enough information to answer the question, say so honestly and reply that you do not know the answer.
Base your answers solely on the provided context.
Be as concise as possible and answer in at most two paragraphs.";

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    /// Number of documents included
    pub document_count: usize,
    /// Document IDs included, in prompt order
    pub document_ids: Vec<String>,
}

/// Context builder for assembling grounded prompts
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder;

impl ContextBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build context from documents in their given order.
    ///
    /// Documents without text are skipped and numbering stays contiguous.
    pub fn build(&self, documents: &[Document]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut document_ids = Vec::new();

        for doc in documents {
            if let Some(text) = doc.text() {
                parts.push(format!("[Document {}]\n{}", parts.len() + 1, text));
                document_ids.push(doc.id.clone());
            }
        }

        let text = if parts.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            parts.join("\n\n")
        };

        AssembledContext {
            text,
            document_count: document_ids.len(),
            document_ids,
        }
    }

    /// Full prompt: instructions, context, question
    pub fn prompt(&self, question: &str, documents: &[Document]) -> String {
        let context = self.build(documents);

        format!(
            "{}\n\nContext:\n{}\n\nQuestion: {}\n\nAnswer:",
            SYSTEM_PROMPT, context.text, question
        )
    }
}
