//! Local Ollama backend.

use async_trait::async_trait;
use log::error;
use serde::{Deserialize, Serialize};

use super::{check_status, TextGenerationBackend};
use crate::config::BackendSettings;
use crate::error::BackendError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Calls `POST {host}/api/generate` with streaming disabled.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, settings: &BackendSettings) -> Self {
        Self {
            client,
            base_url: settings.ollama_url(),
            model: settings.ollama_model.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl TextGenerationBackend for OllamaBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "Could not reach Ollama at {}; check that it is running and OLLAMA_HOST is correct",
                    self.base_url
                );
                BackendError::Http(e)
            })?;

        let body: GenerateResponse = check_status(response).await?.json().await?;
        if body.response.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_settings() {
        let mut settings = BackendSettings::default();
        settings.ollama_host = "10.0.0.5".to_string();

        let backend = OllamaBackend::new(reqwest::Client::new(), &settings);
        assert_eq!(backend.base_url(), "http://10.0.0.5:11434");
        assert_eq!(backend.name(), "gemma:2b");
    }

    #[test]
    fn test_request_disables_streaming() {
        let request = GenerateRequest {
            model: "gemma:2b",
            prompt: "hi",
            stream: false,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["stream"], serde_json::json!(false));
    }
}
