use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Service configuration, read once at startup and shared read-only afterwards.
///
/// Precedence: defaults < TOML file < `.env` / process environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub embedding: EmbeddingConfig,
    pub vector: VectorConfig,
    pub llm: LlmConfig,
    pub reranker: RerankerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            environment: Environment::Development,
        }
    }
}

impl ServerConfig {
    /// Error details are only exposed to callers in development
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// HuggingFace model id of a BERT-family sentence embedding model
    pub model: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "sentence-transformers/all-MiniLM-L6-v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Supabase,
    Qdrant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorConfig {
    pub backend: VectorBackend,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    /// Table (Supabase) or collection (Qdrant) holding the document vectors
    pub table_name: String,
    /// Postgres similarity-search function exposed over PostgREST
    pub match_function: String,
    pub qdrant_url: String,
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: VectorBackend::Supabase,
            supabase_url: None,
            supabase_key: None,
            table_name: "documents".to_string(),
            match_function: "match_doc".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://ollama:11434".to_string(),
            model: "llama3.2:latest".to_string(),
            temperature: 1.0,
            timeout_secs: 180,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    /// Cross-encoder model id, or `keyword` for the lexical scorer
    pub model: String,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub match_count: usize,
    pub match_threshold: f64,
    /// Candidates fetched before reranking (reranking enabled only)
    pub initial_retrieval_count: usize,
    /// Candidates kept after reranking (reranking enabled only)
    pub final_result_count: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: 3,
            match_threshold: 0.7,
            initial_retrieval_count: 20,
            final_result_count: 3,
        }
    }
}

impl Config {
    /// Load configuration: file (explicit path, else the default path if present),
    /// then `.env` and process environment on top, then validate ranges.
    /// Vector-store credentials are checked separately by `require_vector_store`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::config_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Config::default()
                }
            }
        };

        // A missing .env file is normal outside development
        dotenvy::dotenv().ok();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Parse a TOML configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Get the default configuration file path
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;

        Ok(home.join(".ragquery").join("config.toml"))
    }

    /// Overlay environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = get("APP_ENV") {
            self.server.environment = match v.trim().to_lowercase().as_str() {
                "development" | "dev" => Environment::Development,
                "production" | "prod" => Environment::Production,
                other => bail!("APP_ENV must be 'development' or 'production', got '{}'", other),
            };
        }

        if let Some(v) = get("EMBEDDING_MODEL") {
            self.embedding.model = v;
        }

        if let Some(v) = get("VECTOR_BACKEND") {
            self.vector.backend = match v.trim().to_lowercase().as_str() {
                "supabase" => VectorBackend::Supabase,
                "qdrant" => VectorBackend::Qdrant,
                other => bail!("VECTOR_BACKEND must be 'supabase' or 'qdrant', got '{}'", other),
            };
        }
        if let Some(v) = get("SUPABASE_URL") {
            self.vector.supabase_url = Some(v);
        }
        if let Some(v) = get("SUPABASE_KEY") {
            self.vector.supabase_key = Some(v);
        }
        if let Some(v) = get("VECTOR_TABLE_NAME") {
            self.vector.table_name = v;
        }
        if let Some(v) = get("MATCH_FUNCTION") {
            self.vector.match_function = v;
        }
        if let Some(v) = get("QDRANT_URL") {
            self.vector.qdrant_url = v;
        }

        if let Some(v) = get("OLLAMA_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = get("LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = get("LLM_TEMPERATURE") {
            self.llm.temperature = parse_var("LLM_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("GENERATION_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_var("GENERATION_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("RERANKER_ENABLED") {
            self.reranker.enabled = parse_bool("RERANKER_ENABLED", &v)?;
        }
        if let Some(v) = get("RERANKER_MODEL") {
            self.reranker.model = v;
        }

        if let Some(v) = get("MATCH_COUNT") {
            self.retrieval.match_count = parse_var("MATCH_COUNT", &v)?;
        }
        if let Some(v) = get("MATCH_THRESHOLD") {
            self.retrieval.match_threshold = parse_var("MATCH_THRESHOLD", &v)?;
        }
        if let Some(v) = get("INITIAL_RETRIEVAL_COUNT") {
            self.retrieval.initial_retrieval_count = parse_var("INITIAL_RETRIEVAL_COUNT", &v)?;
        }
        if let Some(v) = get("FINAL_RESULT_COUNT") {
            self.retrieval.final_result_count = parse_var("FINAL_RESULT_COUNT", &v)?;
        }

        Ok(())
    }

    /// Check the vector-store settings needed by commands that search
    pub fn require_vector_store(&self) -> Result<()> {
        if self.vector.backend == VectorBackend::Supabase {
            let missing: Vec<&str> = [
                ("SUPABASE_URL", &self.vector.supabase_url),
                ("SUPABASE_KEY", &self.vector.supabase_key),
            ]
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

            if !missing.is_empty() {
                bail!(
                    "Missing required environment variables: {}. Please check your .env file.",
                    missing.join(", ")
                );
            }
        }

        Ok(())
    }

    /// Validate value ranges
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.retrieval.match_threshold) {
            bail!(
                "MATCH_THRESHOLD must be between 0 and 1, got {}",
                self.retrieval.match_threshold
            );
        }

        for (name, value) in [
            ("MATCH_COUNT", self.retrieval.match_count),
            ("INITIAL_RETRIEVAL_COUNT", self.retrieval.initial_retrieval_count),
            ("FINAL_RESULT_COUNT", self.retrieval.final_result_count),
        ] {
            if value == 0 {
                bail!("{} must be a positive integer", name);
            }
        }

        if self.llm.timeout_secs == 0 {
            bail!("GENERATION_TIMEOUT_SECS must be a positive integer");
        }

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {}: '{}'", name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => bail!("Invalid value for {}: '{}'", name, value),
    }
}
