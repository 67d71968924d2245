// Query pipeline: embed -> retrieve -> (rerank) -> answer
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::errors::{QueryError, Result};
use crate::generation::Answerer;
use crate::pipeline::state::{QueryStage, StageTracker};
use crate::reranking::ReRanker;
use crate::retrieval::{RetrievalEngine, SearchParams};
use crate::types::{
    Document, EmbeddingVector, Query, QueryMetadata, QueryResult, StreamEvent,
    NO_INFORMATION_ANSWER,
};

/// Message reported to callers for any pipeline failure
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred processing your request";

/// Events buffered between the producer task and the consumer
pub const STREAM_BUFFER: usize = 32;

/// Services a pipeline composes. Each is shared by all in-flight queries.
#[derive(Clone)]
pub struct PipelineServices {
    pub embedder: Arc<dyn Embedder>,
    pub retriever: RetrievalEngine,
    pub reranker: Option<ReRanker>,
    pub answerer: Answerer,
}

/// Candidate counts used when reranking is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalPolicy {
    /// Candidates fetched for the reranker, replacing the caller's match_count
    pub initial_retrieval_count: usize,
    /// Candidates kept after reranking
    pub final_result_count: usize,
}

impl RetrievalPolicy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            initial_retrieval_count: config.initial_retrieval_count,
            final_result_count: config.final_result_count,
        }
    }

    /// Search parameters for `query`
    pub fn search_params(&self, query: &Query, reranking: bool) -> SearchParams {
        let match_count = if reranking {
            self.initial_retrieval_count
        } else {
            query.match_count()
        };

        SearchParams {
            match_count,
            match_threshold: query.match_threshold(),
        }
    }
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Sequences the services for one query at a time; cheap to clone.
///
/// Every query calls the embedder once, the retriever once, the reranker at
/// most once and the answerer at most once. Nothing is retried.
#[derive(Clone)]
pub struct QueryPipeline {
    services: Arc<PipelineServices>,
    policy: RetrievalPolicy,
}

impl QueryPipeline {
    pub fn new(services: PipelineServices, policy: RetrievalPolicy) -> Self {
        Self {
            services: Arc::new(services),
            policy,
        }
    }

    /// Answer `query` in one response
    pub async fn run(&self, query: &Query) -> Result<QueryResult> {
        let span = info_span!("query", request_id = %Uuid::new_v4(), streaming = false);

        async {
            let start = Instant::now();
            let mut tracker = StageTracker::new();
            info!(question = query.text(), "Processing query");

            match self.execute(query, &mut tracker).await {
                Ok(result) => {
                    info!(
                        sources = result.sources.len(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Query complete"
                    );
                    Ok(result)
                }
                Err(err) => {
                    error!(stage = ?tracker.stage(), error = %err, "Query failed");
                    tracker.fail();
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Answer `query` as an ordered event stream.
    ///
    /// Events are produced by a spawned task. Dropping the returned stream
    /// stops production at the next event.
    pub fn run_stream(&self, query: Query) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let span = info_span!("query", request_id = %Uuid::new_v4(), streaming = true);
        let pipeline = self.clone();

        tokio::spawn(async move { pipeline.produce(query, tx).await }.instrument(span));

        ReceiverStream::new(rx)
    }

    /// Embed arbitrary text with the pipeline's embedder
    pub async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.services.embedder.embed(text).await
    }

    /// Embedding dimension
    pub fn dimension(&self) -> usize {
        self.services.embedder.dimension()
    }

    pub fn reranking_enabled(&self) -> bool {
        self.services.reranker.is_some()
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    async fn execute(&self, query: &Query, tracker: &mut StageTracker) -> Result<QueryResult> {
        let documents = self.retrieve(query, tracker).await?;

        if documents.is_empty() {
            info!("No matching documents, skipping generation");
            tracker.advance(QueryStage::Complete)?;
            return Ok(QueryResult::no_matches(query));
        }

        tracker.advance(QueryStage::Generating)?;
        let answer = self
            .services
            .answerer
            .answer(query.text(), &documents)
            .await?;

        tracker.advance(QueryStage::Complete)?;
        Ok(QueryResult::answered(query, answer, documents))
    }

    /// Embed, search and optionally rerank
    async fn retrieve(&self, query: &Query, tracker: &mut StageTracker) -> Result<Vec<Document>> {
        tracker.advance(QueryStage::Embedding)?;
        let vector = self.services.embedder.embed(query.text()).await?;

        tracker.advance(QueryStage::Retrieving)?;
        let params = self.policy.search_params(query, self.reranking_enabled());
        let candidates = self.services.retriever.search(&vector, &params).await?;

        info!(
            backend = self.services.retriever.backend(),
            match_count = params.match_count,
            match_threshold = params.match_threshold,
            found = candidates.len(),
            "Retrieved documents"
        );

        match &self.services.reranker {
            Some(reranker) if !candidates.is_empty() => {
                tracker.advance(QueryStage::Reranking)?;
                reranker
                    .rerank(query.text(), candidates, self.policy.final_result_count)
                    .await
            }
            _ => Ok(candidates),
        }
    }

    async fn produce(&self, query: Query, tx: mpsc::Sender<StreamEvent>) {
        let mut tracker = StageTracker::new();
        info!(question = query.text(), "Processing streaming query");

        if let Err(err) = self.stream_events(&query, &tx, &mut tracker).await {
            if tx.is_closed() {
                debug!(stage = ?tracker.stage(), "Client disconnected, stopping stream");
                return;
            }

            error!(stage = ?tracker.stage(), error = %err, "Streaming query failed");
            tracker.fail();

            let event = StreamEvent::Error {
                error: GENERIC_ERROR_MESSAGE.to_string(),
                details: Some(err.to_string()),
            };
            let _ = tx.send(event).await;
        }
    }

    async fn stream_events(
        &self,
        query: &Query,
        tx: &mpsc::Sender<StreamEvent>,
        tracker: &mut StageTracker,
    ) -> Result<()> {
        let documents = self.retrieve(query, tracker).await?;
        let metadata = QueryMetadata {
            question: query.text().to_string(),
            num_sources: documents.len(),
            match_threshold: query.match_threshold(),
        };

        send(tx, StreamEvent::Sources { sources: documents.clone() }).await?;
        send(tx, StreamEvent::Metadata { metadata }).await?;

        if documents.is_empty() {
            info!("No matching documents, skipping generation");
            send(
                tx,
                StreamEvent::Chunk {
                    content: NO_INFORMATION_ANSWER.to_string(),
                },
            )
            .await?;
        } else {
            tracker.advance(QueryStage::Streaming)?;
            let mut fragments = self
                .services
                .answerer
                .answer_stream(query.text(), &documents)
                .await?;

            let mut count = 0usize;
            while let Some(fragment) = fragments.next().await {
                send(tx, StreamEvent::Chunk { content: fragment? }).await?;
                count += 1;
            }
            debug!(chunks = count, "Answer streamed");
        }

        tracker.advance(QueryStage::Done)?;
        send(tx, StreamEvent::Done).await
    }
}

async fn send(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| QueryError::Streaming("event receiver dropped".to_string()))
}
