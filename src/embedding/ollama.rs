//! Ollama embedding client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Embedder;
use crate::backend::check_status;
use crate::config::BackendSettings;
use crate::error::BackendError;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Calls `POST {host}/api/embeddings`.
#[derive(Debug, Clone)]
pub struct OllamaEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(client: reqwest::Client, settings: &BackendSettings) -> Self {
        Self {
            client,
            base_url: settings.ollama_url(),
            model: settings.embedding_model.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await?;

        let body: EmbeddingResponse = check_status(response).await?.json().await?;
        if body.embedding.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(body.embedding)
    }
}
