//! Embeddings and Similarity Search
//!
//! Stored prompts (registered or produced by workflow assembly) get a
//! vector under the matching `embedding:` key. Vectors are normalized
//! before they are written, so cosine similarity reduces to a dot product.
//!
//! # Structure
//!
//! - [`Embedder`]: turns text into a vector ([`OllamaEmbedder`] over HTTP)
//! - [`EmbeddingService`]: embeds a stored prompt by key
//! - [`StoreEmbeddingService`]: the store-backed implementation, with
//!   backfill and search

pub mod ollama;
pub mod service;

use async_trait::async_trait;

use crate::error::{BackendError, Result};

pub use ollama::OllamaEmbedder;
pub use service::{SearchHit, StoreEmbeddingService};

/// Produces embedding vectors for text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, BackendError>;
}

/// Embeds stored prompts.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embeds the prompt stored under `storage_key` and persists the vector.
    async fn embed_for_key(&self, storage_key: &str) -> Result<()>;
}

/// Scales a vector to unit length. Zero vectors are returned unchanged.
pub fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut vector {
            *value /= norm;
        }
    }
    vector
}

/// Cosine similarity of two vectors.
///
/// Returns 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|v| v * v).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
