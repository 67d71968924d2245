// Local sentence embeddings via Candle
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::embedding::{l2_normalize, Embedder};
use crate::errors::{QueryError, Result};
use crate::types::EmbeddingVector;

/// Model state shared by concurrent queries
struct EncoderInner {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dimension: usize,
}

/// BERT-family sentence embedder (mean pooling + L2 normalization)
#[derive(Clone)]
pub struct CandleEmbedder {
    inner: Arc<EncoderInner>,
    model_id: String,
}

impl CandleEmbedder {
    /// Load a model from the HuggingFace Hub (downloads on first use)
    pub fn load(model_id: &str) -> AnyResult<Self> {
        let device = Device::Cpu;

        info!(model = model_id, "Loading embedding model");

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download model config")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse model config")?;
        let dimension = serde_json::from_str::<serde_json::Value>(&config_contents)
            .ok()
            .and_then(|raw| raw.get("hidden_size").and_then(|v| v.as_u64()))
            .context("Model config has no hidden_size")? as usize;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        // Long inputs are cut to the model's window; padding is done per batch below
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: 512,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the safetensors file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load model weights")?
        };

        let model = BertModel::load(vb, &config).context("Failed to create BERT model")?;

        info!(model = model_id, dimension, "Embedding model loaded");

        Ok(Self {
            inner: Arc::new(EncoderInner {
                model,
                tokenizer,
                device,
                dimension,
            }),
            model_id: model_id.to_string(),
        })
    }

    /// Model identifier this embedder was loaded from
    pub fn model_id(&self) -> &str {
        &self.model_id
    }
}

impl EncoderInner {
    /// Embed a batch of texts synchronously
    fn embed_batch(&self, texts: &[&str]) -> AnyResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = texts.len();

        // Pad sequences
        let mut flat_ids = vec![0u32; batch_size * max_len];
        let mut flat_types = vec![0u32; batch_size * max_len];
        let mut flat_mask = vec![0u32; batch_size * max_len];

        for (i, encoding) in encodings.iter().enumerate() {
            let row = i * max_len;
            let ids = encoding.get_ids();
            flat_ids[row..row + ids.len()].copy_from_slice(ids);
            flat_types[row..row + ids.len()].copy_from_slice(encoding.get_type_ids());
            flat_mask[row..row + ids.len()].copy_from_slice(encoding.get_attention_mask());
        }

        let token_ids = Tensor::from_vec(flat_ids, (batch_size, max_len), &self.device)?;
        let token_type_ids = Tensor::from_vec(flat_types, (batch_size, max_len), &self.device)?;
        let attention_mask = Tensor::from_vec(flat_mask, (batch_size, max_len), &self.device)?;

        let hidden = self
            .model
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        let pooled = mean_pool(&hidden, &attention_mask)?;

        Ok(pooled
            .to_vec2::<f32>()?
            .into_iter()
            .map(l2_normalize)
            .collect())
    }
}

/// Mean pooling with attention mask
fn mean_pool(embeddings: &Tensor, attention_mask: &Tensor) -> AnyResult<Tensor> {
    let mask_expanded = attention_mask
        .unsqueeze(2)?
        .expand(embeddings.shape())?
        .to_dtype(embeddings.dtype())?;

    let sum_embeddings = (embeddings * &mask_expanded)?.sum(1)?;
    let sum_mask = mask_expanded.sum(1)?.clamp(1e-9, f64::MAX)?;

    Ok(sum_embeddings.broadcast_div(&sum_mask)?)
}

#[async_trait]
impl Embedder for CandleEmbedder {
    async fn embed(&self, text: &str) -> Result<EmbeddingVector> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();

        // Forward passes are CPU-bound; keep them off the async workers
        let mut vectors = tokio::task::spawn_blocking(move || inner.embed_batch(&[text.as_str()]))
            .await
            .map_err(|e| QueryError::Embedding(format!("embedding task failed: {}", e)))?
            .map_err(|e| QueryError::Embedding(format!("{:#}", e)))?;

        vectors
            .pop()
            .ok_or_else(|| QueryError::Embedding("model returned no vector".to_string()))
    }

    fn dimension(&self) -> usize {
        self.inner.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

    fn norm(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_embedding_dimension_and_norm() {
        let embedder = CandleEmbedder::load(TEST_MODEL).expect("Failed to load model");
        let embedding = embedder.embed("Normalized embedding test").await.unwrap();
        assert_eq!(embedding.len(), 384);
        assert_eq!(embedder.dimension(), 384);
        assert!((norm(&embedding) - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_embedding_is_deterministic() {
        let embedder = CandleEmbedder::load(TEST_MODEL).expect("Failed to load model");
        let first = embedder.embed("Consistency test").await.unwrap();
        let second = embedder.embed("Consistency test").await.unwrap();
        for (a, b) in first.iter().zip(second.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_empty_and_long_inputs() {
        let embedder = CandleEmbedder::load(TEST_MODEL).expect("Failed to load model");
        assert_eq!(embedder.embed("").await.unwrap().len(), 384);
        let long = "This is a very long text. ".repeat(100);
        assert_eq!(embedder.embed(&long).await.unwrap().len(), 384);
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_similar_texts_are_closer() {
        let embedder = CandleEmbedder::load(TEST_MODEL).expect("Failed to load model");
        let a = embedder.embed("I love machine learning").await.unwrap();
        let b = embedder.embed("I enjoy artificial intelligence").await.unwrap();
        let c = embedder.embed("The weather is nice today").await.unwrap();
        assert!(cosine(&a, &b) > cosine(&a, &c));
    }
}
