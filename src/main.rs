//! ragquery - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ragquery::{
    cli::{Args, Commands, Verbosity},
    config::{Config, VectorBackend},
    embedding::{CandleEmbedder, Embedder},
    generation::{Answerer, OllamaClient},
    pipeline::{PipelineServices, QueryPipeline, RetrievalPolicy},
    reranking::{CrossEncoderScorer, KeywordScorer, ReRanker, RelevanceScorer},
    retrieval::{QdrantStore, RetrievalEngine, SupabaseStore, VectorStore},
    server::{self, AppState},
    types::{Document, Query, QueryResult, StreamEvent, StreamTranscript},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let verbosity = args.verbosity();
    init_tracing(verbosity);

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    match args.command() {
        Commands::Serve => {
            config.require_vector_store()?;
            run_server(config).await
        }
        Commands::Query {
            question,
            stream,
            match_count,
            match_threshold,
        } => {
            config.require_vector_store()?;
            let count = match_count.unwrap_or(config.retrieval.match_count);
            let threshold = match_threshold.unwrap_or(config.retrieval.match_threshold);
            let query = Query::new(&question, count, threshold)?;
            run_query(config, query, stream, verbosity).await
        }
        Commands::Embed { text } => run_embed(config, &text).await,
    }
}

/// `RUST_LOG` wins over the verbosity flags
fn init_tracing(verbosity: Verbosity) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(verbosity.filter()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    info!(model = %config.embedding.model, "Loading embedding model");
    let embedder = CandleEmbedder::load(&config.embedding.model)
        .with_context(|| format!("Failed to load embedding model {}", config.embedding.model))?;
    info!(
        model = embedder.model_id(),
        dimension = embedder.dimension(),
        "Embedder ready"
    );
    Ok(Arc::new(embedder))
}

fn build_store(config: &Config) -> Result<Arc<dyn VectorStore>> {
    let vector = &config.vector;

    let store: Arc<dyn VectorStore> = match vector.backend {
        VectorBackend::Supabase => {
            let url = vector.supabase_url.as_deref().context("SUPABASE_URL is not set")?;
            let key = vector.supabase_key.as_deref().context("SUPABASE_KEY is not set")?;
            Arc::new(SupabaseStore::new(url, key, &vector.match_function)?)
        }
        VectorBackend::Qdrant => {
            let store = QdrantStore::connect(&vector.qdrant_url, &vector.table_name)?;
            info!(collection = store.collection(), "Searching Qdrant collection");
            Arc::new(store)
        }
    };

    Ok(store)
}

fn build_reranker(config: &Config) -> Result<Option<ReRanker>> {
    if !config.reranker.enabled {
        return Ok(None);
    }

    let scorer: Arc<dyn RelevanceScorer> = if config.reranker.model == "keyword" {
        Arc::new(KeywordScorer::new())
    } else {
        info!(model = %config.reranker.model, "Loading reranker model");
        Arc::new(
            CrossEncoderScorer::load(&config.reranker.model)
                .with_context(|| format!("Failed to load reranker {}", config.reranker.model))?,
        )
    };

    let reranker = ReRanker::new(scorer);
    info!(scorer = reranker.scorer_name(), "Reranking enabled");
    Ok(Some(reranker))
}

fn build_llm(config: &Config) -> Result<OllamaClient> {
    let llm = &config.llm;
    Ok(OllamaClient::with_config(
        &llm.base_url,
        &llm.model,
        llm.temperature,
        Duration::from_secs(llm.timeout_secs),
    )?)
}

fn build_pipeline(config: &Config, llm: OllamaClient) -> Result<QueryPipeline> {
    let services = PipelineServices {
        embedder: load_embedder(config)?,
        retriever: RetrievalEngine::new(build_store(config)?),
        reranker: build_reranker(config)?,
        answerer: Answerer::new(Arc::new(llm)),
    };

    Ok(QueryPipeline::new(
        services,
        RetrievalPolicy::from_config(&config.retrieval),
    ))
}

async fn run_server(config: Config) -> Result<()> {
    let llm = build_llm(&config)?;
    if !llm.health_check().await? {
        warn!(
            url = llm.base_url(),
            "Ollama is not reachable yet; queries will fail until it is"
        );
    }

    let pipeline = build_pipeline(&config, llm)?;
    let policy = pipeline.policy();
    info!(
        dimension = pipeline.dimension(),
        initial_retrieval_count = policy.initial_retrieval_count,
        final_result_count = policy.final_result_count,
        "Pipeline ready"
    );

    let host = config.server.host.clone();
    let port = config.server.port;

    server::serve(AppState::new(pipeline, config), &host, port).await
}

async fn run_query(config: Config, query: Query, stream: bool, verbosity: Verbosity) -> Result<()> {
    let llm = build_llm(&config)?;
    if !llm.health_check().await? {
        eprintln!(
            "{} Ollama is not running at {}",
            "✗".red().bold(),
            llm.base_url()
        );
        anyhow::bail!("Ollama not reachable");
    }

    let pipeline = build_pipeline(&config, llm)?;

    let spinner = verbosity.show_progress().then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Searching documents...");
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    });

    let result = if stream {
        stream_answer(&pipeline, query, spinner.as_ref()).await?
    } else {
        let result = pipeline.run(&query).await;
        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }
        let result = result?;
        println!("{}", result.answer);
        result
    };

    print_sources(&result);
    Ok(())
}

async fn stream_answer(
    pipeline: &QueryPipeline,
    query: Query,
    spinner: Option<&ProgressBar>,
) -> Result<QueryResult> {
    let mut events = pipeline.run_stream(query);
    let mut transcript = StreamTranscript::new();
    let mut stdout = std::io::stdout();
    let mut first = true;

    while let Some(event) = events.next().await {
        if first {
            if let Some(pb) = spinner {
                pb.finish_and_clear();
            }
            first = false;
        }

        let recorded = transcript.record(&event);
        if let StreamEvent::Chunk { content } = &event {
            print!("{}", content);
            stdout.flush()?;
        }
        recorded?;
    }
    println!();

    Ok(transcript.finish()?)
}

fn print_sources(result: &QueryResult) {
    if let Some(message) = &result.message {
        println!("\n{}", message.yellow());
        return;
    }

    println!("\n{}", "Sources:".bold());
    for (i, doc) in result.sources.iter().enumerate() {
        println!("  {}. {}", i + 1, describe(doc));
    }
}

fn describe(doc: &Document) -> String {
    let mut line = format!("[{}] similarity {:.3}", doc.id.cyan(), doc.similarity);
    if let Some(score) = doc.rerank_score {
        line.push_str(&format!(", rerank {:.3}", score));
    }
    line
}

async fn run_embed(config: Config, text: &str) -> Result<()> {
    let embedder = load_embedder(&config)?;
    let vector = embedder.embed(text).await?;

    println!("{}", serde_json::to_string(&vector)?);
    eprintln!("{} {} dimensions", "✓".green(), vector.len());
    Ok(())
}
