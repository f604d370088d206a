//! OpenAI-compatible chat completions backend.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{check_status, TextGenerationBackend};
use crate::config::BackendSettings;
use crate::error::BackendError;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Sends the prompt as a single user message, or a conversation as is.
#[derive(Debug, Clone)]
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, settings: &BackendSettings) -> Self {
        Self {
            client,
            base_url: settings.openai_base_url.trim_end_matches('/').to_string(),
            model: settings.openai_model.clone(),
            api_key: settings.openai_api_key.clone(),
        }
    }
}

#[async_trait]
impl TextGenerationBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        self.complete(vec![ChatMessage {
            role: "user",
            content: prompt,
        }])
        .await
    }

    async fn chat(&self, messages: &[super::ChatMessage]) -> Result<String, BackendError> {
        let messages = messages
            .iter()
            .map(|message| ChatMessage {
                role: message.role.as_str(),
                content: &message.content,
            })
            .collect();
        self.complete(messages).await
    }
}

impl OpenAiBackend {
    async fn complete(&self, messages: Vec<ChatMessage<'_>>) -> Result<String, BackendError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(BackendError::MissingCredentials("OPENAI_API_KEY"))?;

        let request = ChatRequest {
            model: &self.model,
            messages,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let body: ChatResponse = check_status(response).await?.json().await?;
        debug!("{} returned {} choices", self.model, body.choices.len());

        body.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(BackendError::EmptyResponse)
    }
}
