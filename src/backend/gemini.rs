//! Gemini `generateContent` backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_status, ChatMessage, ChatRole, TextGenerationBackend};
use crate::config::BackendSettings;
use crate::error::BackendError;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenates the text parts of the first candidate.
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, settings: &BackendSettings) -> Self {
        Self {
            client,
            base_url: settings.gemini_base_url.trim_end_matches('/').to_string(),
            model: settings.gemini_model.clone(),
            api_key: settings.gemini_api_key.clone(),
        }
    }
}

#[async_trait]
impl TextGenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.generate_content(vec![Content {
            role: None,
            parts: vec![Part { text: prompt }],
        }])
        .await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        self.generate_content(conversation(messages)).await
    }
}

impl GeminiBackend {
    async fn generate_content(&self, contents: Vec<Content<'_>>) -> Result<String, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(BackendError::MissingCredentials("GEMINI_API_KEY"))?;

        let request = GenerateRequest { contents };

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .query(&[("key", api_key)])
            .json(&request)
            .send()
            .await?;

        let body: GenerateResponse = check_status(response).await?.json().await?;
        body.text().ok_or(BackendError::EmptyResponse)
    }
}

/// Gemini calls the assistant side of a conversation `model`.
fn conversation(messages: &[ChatMessage]) -> Vec<Content<'_>> {
    messages
        .iter()
        .map(|message| Content {
            role: Some(match message.role {
                ChatRole::User => "user",
                ChatRole::Assistant => "model",
            }),
            parts: vec![Part {
                text: &message.content,
            }],
        })
        .collect()
}
