// Cross-encoder relevance scoring via Candle
use anyhow::{Context, Result as AnyResult};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};
use candle_transformers::models::bert::{BertModel, Config};
use hf_hub::{api::sync::Api, Repo, RepoType};
use std::sync::Arc;
use tokenizers::Tokenizer;
use tracing::info;

use crate::errors::{QueryError, Result};
use crate::reranking::scorer::RelevanceScorer;

/// Maximum tokens per (question, document) pair
const MAX_PAIR_TOKENS: usize = 512;

struct CrossEncoderInner {
    bert: BertModel,
    pooler: Linear,
    classifier: Linear,
    tokenizer: Tokenizer,
    device: Device,
}

/// BERT sequence-classification cross-encoder (e.g. ms-marco MiniLM).
///
/// Scores are the sigmoid of the single relevance logit, so they lie in (0, 1).
#[derive(Clone)]
pub struct CrossEncoderScorer {
    inner: Arc<CrossEncoderInner>,
}

impl CrossEncoderScorer {
    /// Load a cross-encoder from the HuggingFace Hub
    pub fn load(model_id: &str) -> AnyResult<Self> {
        let device = Device::Cpu;

        info!(model = model_id, "Loading reranker model");

        let api = Api::new().context("Failed to create HuggingFace API client")?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download reranker config")?;
        let tokenizer_path = repo
            .get("tokenizer.json")
            .context("Failed to download reranker tokenizer")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download reranker weights")?;

        let config_contents =
            std::fs::read_to_string(config_path).context("Failed to read reranker config")?;
        let config: Config =
            serde_json::from_str(&config_contents).context("Failed to parse reranker config")?;
        let hidden_size = serde_json::from_str::<serde_json::Value>(&config_contents)
            .ok()
            .and_then(|raw| raw.get("hidden_size").and_then(|v| v.as_u64()))
            .context("Reranker config has no hidden_size")? as usize;

        let mut tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow::anyhow!("Failed to load tokenizer: {}", e))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_PAIR_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("Failed to configure truncation: {}", e))?;

        // SAFETY: the safetensors file is not modified while mapped
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)
                .context("Failed to load reranker weights")?
        };

        let bert = BertModel::load(vb.clone(), &config).context("Failed to create BERT model")?;
        let pooler = linear(hidden_size, hidden_size, vb.pp("bert.pooler.dense"))
            .context("Failed to load pooler")?;
        let classifier =
            linear(hidden_size, 1, vb.pp("classifier")).context("Failed to load classifier")?;

        info!(model = model_id, "Reranker model loaded");

        Ok(Self {
            inner: Arc::new(CrossEncoderInner {
                bert,
                pooler,
                classifier,
                tokenizer,
                device,
            }),
        })
    }
}

impl CrossEncoderInner {
    fn score_pairs(&self, question: &str, contents: &[String]) -> AnyResult<Vec<f32>> {
        if contents.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = contents.iter().map(|c| (question, c.as_str())).collect();
        let encodings = self
            .tokenizer
            .encode_batch(pairs, true)
            .map_err(|e| anyhow::anyhow!("Tokenization failed: {}", e))?;

        let max_len = encodings.iter().map(|e| e.get_ids().len()).max().unwrap_or(0);
        let batch_size = encodings.len();

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
            .bert
            .forward(&token_ids, &token_type_ids, Some(&attention_mask))?;

        // [CLS] token -> pooler (tanh) -> single logit
        let cls = hidden.narrow(1, 0, 1)?.squeeze(1)?;
        let pooled = self.pooler.forward(&cls)?.tanh()?;
        let logits = self.classifier.forward(&pooled)?.squeeze(1)?;
        let scores = candle_nn::ops::sigmoid(&logits)?;

        Ok(scores.to_vec1::<f32>()?)
    }
}

#[async_trait]
impl RelevanceScorer for CrossEncoderScorer {
    async fn score(&self, question: &str, contents: &[&str]) -> Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let question = question.to_string();
        let contents: Vec<String> = contents.iter().map(|c| c.to_string()).collect();

        tokio::task::spawn_blocking(move || inner.score_pairs(&question, &contents))
            .await
            .map_err(|e| QueryError::Reranking(format!("reranking task failed: {}", e)))?
            .map_err(|e| QueryError::Reranking(format!("{:#}", e)))
    }

    fn name(&self) -> &str {
        "cross-encoder"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MODEL: &str = "cross-encoder/ms-marco-MiniLM-L-6-v2";

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_relevant_document_scores_higher() {
        let scorer = CrossEncoderScorer::load(TEST_MODEL).expect("Failed to load reranker");
        let scores = scorer
            .score(
                "How do I reset my password?",
                &[
                    "The cafeteria opens at 8am.",
                    "To reset your password, click the Forgot Password link.",
                    "",
                ],
            )
            .await
            .unwrap();

        assert_eq!(scores.len(), 3);
        assert!(scores[1] > scores[0]);
        assert!(scores.iter().all(|s| (0.0..=1.0).contains(s)));
    }

    #[tokio::test]
    #[ignore] // Integration test - requires model download
    async fn test_scores_are_deterministic() {
        let scorer = CrossEncoderScorer::load(TEST_MODEL).expect("Failed to load reranker");
        let docs = ["VPN drops every hour on the guest network."];
        let first = scorer.score("Why does my VPN disconnect?", &docs).await.unwrap();
        let second = scorer.score("Why does my VPN disconnect?", &docs).await.unwrap();
        assert_eq!(first, second);
    }
}
