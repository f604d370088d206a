//! Text Generation Backends
//!
//! The engine decides *which* backend runs a prompt; implementations of
//! [`TextGenerationBackend`] decide *how*. Three HTTP clients are provided:
//!
//! - [`openai`]: OpenAI-compatible chat completions (primary remote)
//! - [`gemini`]: Gemini `generateContent` (secondary remote)
//! - [`ollama`]: Ollama `/api/generate` (local)

pub mod gemini;
pub mod ollama;
pub mod openai;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::BackendSettings;
use crate::error::BackendError;
use crate::execution::router::BackendCapability;

pub use gemini::GeminiBackend;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

/// Speaker of a chat message.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message of a multi-turn conversation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// A service that turns a prompt into generated text.
#[async_trait]
pub trait TextGenerationBackend: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Generates a completion for the prompt.
    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;

    /// Continues a conversation.
    ///
    /// Backends without a multi-turn API get the transcript flattened into
    /// a single prompt.
    async fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        self.generate(&flatten_transcript(messages)).await
    }
}

/// Renders a conversation as one prompt.
///
/// A lone user message is passed through as is.
pub fn flatten_transcript(messages: &[ChatMessage]) -> String {
    if let [only] = messages {
        if only.role == ChatRole::User {
            return only.content.clone();
        }
    }

    let mut transcript = String::new();
    for message in messages {
        let speaker = match message.role {
            ChatRole::User => "User",
            ChatRole::Assistant => "Assistant",
        };
        transcript.push_str(speaker);
        transcript.push_str(": ");
        transcript.push_str(&message.content);
        transcript.push_str("\n\n");
    }
    transcript.push_str("Assistant:");
    transcript
}

/// Backends registered per capability.
///
/// [`BackendCapability::Passthrough`] never needs a registration: it returns
/// the prompt unchanged.
#[derive(Clone, Default)]
pub struct BackendSet {
    backends: HashMap<BackendCapability, Arc<dyn TextGenerationBackend>>,
}

impl BackendSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the three HTTP backends from settings.
    pub fn from_settings(settings: &BackendSettings) -> Result<Self, BackendError> {
        let client = http_client(settings.request_timeout_secs)?;

        Ok(Self::new()
            .with(
                BackendCapability::RemoteGenerationPrimary,
                OpenAiBackend::new(client.clone(), settings),
            )
            .with(
                BackendCapability::RemoteGenerationSecondary,
                GeminiBackend::new(client.clone(), settings),
            )
            .with(
                BackendCapability::LocalGeneration,
                OllamaBackend::new(client, settings),
            ))
    }

    /// Registers a backend for a capability, replacing any previous one.
    pub fn with(
        mut self,
        capability: BackendCapability,
        backend: impl TextGenerationBackend + 'static,
    ) -> Self {
        self.backends.insert(capability, Arc::new(backend));
        self
    }

    /// Registers an already shared backend.
    pub fn with_shared(
        mut self,
        capability: BackendCapability,
        backend: Arc<dyn TextGenerationBackend>,
    ) -> Self {
        self.backends.insert(capability, backend);
        self
    }

    /// Returns the backend registered for a capability.
    pub fn get(&self, capability: BackendCapability) -> Option<&Arc<dyn TextGenerationBackend>> {
        self.backends.get(&capability)
    }

    /// Runs a prompt on the backend for `capability`.
    pub async fn invoke(
        &self,
        capability: BackendCapability,
        prompt: &str,
    ) -> Result<String, BackendError> {
        if capability == BackendCapability::Passthrough {
            return Ok(prompt.to_string());
        }

        let backend = self
            .get(capability)
            .ok_or(BackendError::NotConfigured(capability))?;

        debug!(
            "Invoking {} backend '{}' ({} chars)",
            capability,
            backend.name(),
            prompt.len()
        );
        backend.generate(prompt).await
    }

    /// Continues a conversation on the backend for `capability`.
    pub async fn chat(
        &self,
        capability: BackendCapability,
        messages: &[ChatMessage],
    ) -> Result<String, BackendError> {
        if capability == BackendCapability::Passthrough {
            return Ok(flatten_transcript(messages));
        }

        let backend = self
            .get(capability)
            .ok_or(BackendError::NotConfigured(capability))?;

        debug!(
            "Chatting with {} backend '{}' ({} messages)",
            capability,
            backend.name(),
            messages.len()
        );
        backend.chat(messages).await
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entries: Vec<(String, &str)> = self
            .backends
            .iter()
            .map(|(capability, backend)| (capability.to_string(), backend.name()))
            .collect();
        entries.sort();
        f.debug_struct("BackendSet").field("backends", &entries).finish()
    }
}

/// Builds the shared HTTP client used by every backend.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, BackendError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("promptflow/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turns a non-success response into [`BackendError::Api`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, BackendError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());

    Err(BackendError::Api { status, message })
}
