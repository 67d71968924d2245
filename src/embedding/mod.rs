//! Text embedding
//!
//! Turns text into a fixed-dimension, unit-length vector. Downstream cosine
//! similarity assumes unit vectors, so every implementation normalizes.

pub mod engine;

pub use engine::CandleEmbedder;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::EmbeddingVector;

/// Embedding capability consumed by the query pipeline
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text. Identical input yields identical output within a process.
    async fn embed(&self, text: &str) -> Result<EmbeddingVector>;

    /// Fixed output dimension
    fn dimension(&self) -> usize;
}

/// Scale a vector to unit L2 norm. Zero vectors are returned unchanged.
pub fn l2_normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}
