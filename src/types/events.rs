//! Events emitted by a streamed query
//!
//! Order on the wire: `sources`, `metadata`, zero or more `chunk`, then
//! `done`. An `error` event may replace any of these and ends the stream.

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};
use crate::types::{Document, QueryMetadata, QueryResult};

/// Tagged stream event, serialized as `{"type": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    /// Final candidate set handed to the answerer
    Sources { sources: Vec<Document> },

    /// Question, source count and threshold
    Metadata { metadata: QueryMetadata },

    /// One non-empty answer fragment
    Chunk { content: String },

    /// Answer complete (terminal)
    Done,

    /// Query failed (terminal)
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        details: Option<String>,
    },
}

impl StreamEvent {
    /// Check if this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Done | StreamEvent::Error { .. })
    }

    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::Sources { .. } => "sources",
            StreamEvent::Metadata { .. } => "metadata",
            StreamEvent::Chunk { .. } => "chunk",
            StreamEvent::Done => "done",
            StreamEvent::Error { .. } => "error",
        }
    }

    /// Drop error details (production responses)
    pub fn without_details(self) -> Self {
        match self {
            StreamEvent::Error { error, .. } => StreamEvent::Error {
                error,
                details: None,
            },
            other => other,
        }
    }
}

/// Consumer-side accumulator that rebuilds a `QueryResult` from events.
///
/// A stream that closes before `done` or `error` is treated as failed.
#[derive(Debug, Default)]
pub struct StreamTranscript {
    sources: Option<Vec<Document>>,
    metadata: Option<QueryMetadata>,
    answer: String,
    finished: bool,
}

impl StreamTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one event, failing on `error` or on anything after a terminal event
    pub fn record(&mut self, event: &StreamEvent) -> Result<()> {
        if self.finished {
            return Err(QueryError::Streaming(format!(
                "received '{}' event after the stream finished",
                event.kind()
            )));
        }

        match event {
            StreamEvent::Sources { sources } => self.sources = Some(sources.clone()),
            StreamEvent::Metadata { metadata } => self.metadata = Some(metadata.clone()),
            StreamEvent::Chunk { content } => self.answer.push_str(content),
            StreamEvent::Done => self.finished = true,
            StreamEvent::Error { error, details } => {
                self.finished = true;
                let message = match details {
                    Some(details) => format!("{}: {}", error, details),
                    None => error.clone(),
                };
                return Err(QueryError::Streaming(message));
            }
        }

        Ok(())
    }

    /// Answer text received so far
    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Finish the transcript once the channel has closed
    pub fn finish(self) -> Result<QueryResult> {
        if !self.finished {
            return Err(QueryError::Streaming(
                "stream closed without a terminal event".to_string(),
            ));
        }

        let metadata = self.metadata.ok_or_else(|| {
            QueryError::Streaming("stream finished without a metadata event".to_string())
        })?;

        Ok(QueryResult {
            success: true,
            answer: self.answer,
            sources: self.sources.unwrap_or_default(),
            metadata,
            message: None,
        })
    }
}
