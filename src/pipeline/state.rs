//! Query stage tracking
//!
//! Each query moves strictly forward through its stages:
//! - Blocking: Received → Embedding → Retrieving → [Reranking] → Generating → Complete
//! - Streaming: ... → Retrieving → [Reranking] → Streaming → Done
//! - Empty retrieval skips straight to Complete/Done
//! - Any non-terminal stage may fail into Error

use serde::{Deserialize, Serialize};

use crate::errors::{QueryError, Result};

/// Stages of a single query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryStage {
    /// Request validated, nothing done yet
    Received,

    /// Computing the query embedding
    Embedding,

    /// Searching the vector store
    Retrieving,

    /// Rescoring candidates
    Reranking,

    /// Blocking answer generation
    Generating,

    /// Forwarding answer fragments
    Streaming,

    /// Blocking query answered (terminal)
    Complete,

    /// Streamed query finished (terminal)
    Done,

    /// Query failed (terminal)
    Error,
}

impl QueryStage {
    /// Check if this is a terminal stage
    pub fn is_terminal(&self) -> bool {
        matches!(self, QueryStage::Complete | QueryStage::Done | QueryStage::Error)
    }

    /// Validate a move to `next`
    pub fn transition(&self, next: QueryStage) -> Result<QueryStage> {
        use QueryStage::*;

        let valid = match (self, next) {
            (from, Error) => !from.is_terminal(),
            (Received, Embedding) => true,
            (Embedding, Retrieving) => true,
            (Retrieving, Reranking) => true,
            (Retrieving, Generating | Streaming | Complete | Done) => true,
            (Reranking, Generating | Streaming | Complete | Done) => true,
            (Generating, Complete) => true,
            (Streaming, Done) => true,
            _ => false,
        };

        if valid {
            Ok(next)
        } else {
            Err(QueryError::InvalidTransition {
                from: format!("{:?}", self),
                to: format!("{:?}", next),
            })
        }
    }

    /// Human-readable stage name
    pub fn display_name(&self) -> &'static str {
        match self {
            QueryStage::Received => "Received",
            QueryStage::Embedding => "Embedding question",
            QueryStage::Retrieving => "Searching documents",
            QueryStage::Reranking => "Reranking documents",
            QueryStage::Generating => "Generating answer",
            QueryStage::Streaming => "Streaming answer",
            QueryStage::Complete => "Completed",
            QueryStage::Done => "Done",
            QueryStage::Error => "Error",
        }
    }
}

/// Current stage of one query, advanced only through valid transitions
#[derive(Debug)]
pub struct StageTracker {
    stage: QueryStage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            stage: QueryStage::Received,
        }
    }

    /// Move to `next`, logging the change
    pub fn advance(&mut self, next: QueryStage) -> Result<()> {
        self.stage = self.stage.transition(next)?;
        tracing::debug!(stage = next.display_name(), "Query stage");
        Ok(())
    }

    /// Mark the query failed; a no-op once terminal
    pub fn fail(&mut self) {
        if !self.stage.is_terminal() {
            self.stage = QueryStage::Error;
        }
    }

    pub fn stage(&self) -> QueryStage {
        self.stage
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}
