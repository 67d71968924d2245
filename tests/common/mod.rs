//! Deterministic in-process stand-ins for the model and database backends

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ragquery::embedding::{l2_normalize, Embedder};
use ragquery::generation::{Answerer, FragmentStream, GenerationBackend};
use ragquery::reranking::{ReRanker, RelevanceScorer};
use ragquery::retrieval::{RetrievalEngine, SearchParams, VectorStore};
use ragquery::types::{Document, EmbeddingVector};
use ragquery::{PipelineServices, QueryError, QueryPipeline, Result, RetrievalPolicy};

pub const DIMENSION: usize = 8;

/// Bag-of-bytes embedder; same text, same vector
#[derive(Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut vector = vec![0.0f32; DIMENSION];
        for (i, byte) in text.bytes().enumerate() {
            vector[(byte as usize + i) % DIMENSION] += 1.0;
        }
        Ok(l2_normalize(vector))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }
}

/// Vector store returning fixed rows, optionally unreachable
#[derive(Default)]
pub struct MemoryStore {
    rows: Vec<Document>,
    unreachable: bool,
    pub calls: AtomicUsize,
    pub last_params: Mutex<Option<SearchParams>>,
}

impl MemoryStore {
    pub fn with_rows(rows: Vec<Document>) -> Self {
        Self {
            rows,
            ..Default::default()
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn query(&self, _vector: &[f32], params: &SearchParams) -> Result<Vec<Document>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().unwrap() = Some(*params);

        if self.unreachable {
            return Err(QueryError::Retrieval("connection refused".to_string()));
        }
        Ok(self.rows.clone())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// How a scripted backend behaves
#[derive(Clone)]
pub enum Script {
    /// Answer with these fragments
    Answer(Vec<&'static str>),
    /// Backend rejects the request outright
    Fail,
    /// Emit these fragments, then break mid-stream
    BreakAfter(Vec<&'static str>),
}

/// Language model replaying a script and counting calls
pub struct ScriptedBackend {
    script: Script,
    pub calls: AtomicUsize,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(fragments: Vec<&'static str>) -> Self {
        Self::new(Script::Answer(fragments))
    }

    fn record(&self, prompt: &str) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.record(prompt);
        match &self.script {
            Script::Answer(fragments) => Ok(fragments.concat()),
            Script::Fail | Script::BreakAfter(_) => {
                Err(QueryError::Generation("model not found".to_string()))
            }
        }
    }

    async fn complete_stream(&self, prompt: &str) -> Result<FragmentStream> {
        self.record(prompt);
        let items: Vec<Result<String>> = match &self.script {
            Script::Answer(fragments) => fragments.iter().map(|f| Ok(f.to_string())).collect(),
            Script::Fail => return Err(QueryError::Generation("model not found".to_string())),
            Script::BreakAfter(fragments) => fragments
                .iter()
                .map(|f| Ok(f.to_string()))
                .chain(std::iter::once(Err(QueryError::Streaming(
                    "connection reset".to_string(),
                ))))
                .collect(),
        };
        Ok(stream::iter(items).boxed())
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Scores documents by the number ending their content, so `doc-9` beats `doc-1`
#[derive(Default)]
pub struct IdScorer {
    pub calls: AtomicUsize,
    pub batch_sizes: Mutex<Vec<usize>>,
}

#[async_trait]
impl RelevanceScorer for IdScorer {
    async fn score(&self, _question: &str, contents: &[&str]) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_sizes.lock().unwrap().push(contents.len());
        Ok(contents
            .iter()
            .map(|c| {
                c.rsplit(' ')
                    .next()
                    .and_then(|n| n.parse::<f32>().ok())
                    .unwrap_or(0.0)
            })
            .collect())
    }

    fn name(&self) -> &str {
        "id"
    }
}

/// Handles to every fake wired into a pipeline
pub struct Harness {
    pub pipeline: QueryPipeline,
    pub embedder: Arc<HashEmbedder>,
    pub store: Arc<MemoryStore>,
    pub backend: Arc<ScriptedBackend>,
    pub scorer: Option<Arc<IdScorer>>,
}

impl Harness {
    pub fn new(store: MemoryStore, backend: ScriptedBackend) -> Self {
        Self::build(store, backend, false, RetrievalPolicy::default())
    }

    pub fn with_reranker(store: MemoryStore, backend: ScriptedBackend) -> Self {
        Self::build(store, backend, true, RetrievalPolicy::default())
    }

    /// Reranking pipeline with explicit candidate counts
    pub fn with_policy(
        store: MemoryStore,
        backend: ScriptedBackend,
        policy: RetrievalPolicy,
    ) -> Self {
        Self::build(store, backend, true, policy)
    }

    fn build(
        store: MemoryStore,
        backend: ScriptedBackend,
        rerank: bool,
        policy: RetrievalPolicy,
    ) -> Self {
        let embedder = Arc::new(HashEmbedder::default());
        let store = Arc::new(store);
        let backend = Arc::new(backend);
        let scorer = rerank.then(|| Arc::new(IdScorer::default()));

        let services = PipelineServices {
            embedder: embedder.clone(),
            retriever: RetrievalEngine::new(store.clone()),
            reranker: scorer
                .clone()
                .map(|s| ReRanker::new(s as Arc<dyn RelevanceScorer>)),
            answerer: Answerer::new(backend.clone()),
        };

        Self {
            pipeline: QueryPipeline::new(services, policy),
            embedder,
            store,
            backend,
            scorer,
        }
    }

    pub fn generation_calls(&self) -> usize {
        self.backend.calls.load(Ordering::SeqCst)
    }
}

/// Two password-reset documents above the default threshold
pub fn password_docs() -> Vec<Document> {
    vec![
        Document::new(
            "1",
            Some(
                "To reset your password, click the 'Forgot Password' link on the login page."
                    .into(),
            ),
            0.92,
        ),
        Document::new(
            "2",
            Some("You will receive a password reset email within 5 minutes.".into()),
            0.85,
        ),
    ]
}

/// `count` documents whose content ends with their index
pub fn numbered_docs(count: usize) -> Vec<Document> {
    (0..count)
        .map(|i| {
            Document::new(
                format!("doc-{}", i),
                Some(format!("Knowledge base article {}", i)),
                0.95 - i as f64 * 0.01,
            )
        })
        .collect()
}
