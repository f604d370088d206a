//! Fakes shared by unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::backend::{ChatMessage, TextGenerationBackend};
use crate::embedding::{Embedder, EmbeddingService};
use crate::error::{BackendError, Error, Result, StoreError};
use crate::store::KeyValueStore;

/// Answers `"{name}: {prompt}"`.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    name: String,
}

impl EchoBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerationBackend for EchoBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        Ok(format!("{}: {}", self.name, prompt))
    }
}

/// Always fails with a 503.
#[derive(Debug, Clone)]
pub struct FailingBackend {
    name: String,
}

impl FailingBackend {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl TextGenerationBackend for FailingBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _prompt: &str) -> std::result::Result<String, BackendError> {
        Err(BackendError::Api {
            status: 503,
            message: format!("{} unavailable", self.name),
        })
    }
}

/// Records every prompt and answers with scripted replies.
///
/// A prompt containing a scripted trigger gets that reply; anything else is
/// returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    prompts: Arc<Mutex<Vec<String>>>,
    replies: Vec<(String, String)>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(mut self, trigger: &str, reply: &str) -> Self {
        self.replies.push((trigger.to_string(), reply.to_string()));
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerationBackend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let reply = self
            .replies
            .iter()
            .find(|(trigger, _)| prompt.contains(trigger.as_str()))
            .map(|(_, reply)| reply.clone());

        Ok(reply.unwrap_or_else(|| prompt.to_string()))
    }
}

/// Bag-of-words embedder over a tiny fixed vocabulary.
#[derive(Debug, Clone, Default)]
pub struct KeywordEmbedder;

impl KeywordEmbedder {
    const VOCABULARY: [&'static str; 3] = ["cats", "dogs", "birds"];

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, BackendError> {
        let counts: HashMap<&str, f32> = text.split_whitespace().fold(HashMap::new(), |mut acc, word| {
            *acc.entry(word).or_insert(0.0) += 1.0;
            acc
        });

        Ok(Self::VOCABULARY
            .iter()
            .map(|word| counts.get(word).copied().unwrap_or(0.0))
            .collect())
    }
}

/// Embedding service that records requested keys.
#[derive(Debug, Default)]
pub struct RecordingEmbeddings {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingEmbeddings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls, then fails each one.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmbeddingService for RecordingEmbeddings {
    async fn embed_for_key(&self, storage_key: &str) -> Result<()> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(storage_key.to_string());
        }

        if self.fail {
            return Err(Error::Embedding {
                key: storage_key.to_string(),
                reason: "embedding service offline".to_string(),
            });
        }
        Ok(())
    }
}

/// Store whose writes always fail. Reads see an empty store.
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> std::result::Result<Option<Value>, StoreError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: Value) -> std::result::Result<(), StoreError> {
        Err(StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "read-only store",
        )))
    }

    async fn exists(&self, _key: &str) -> std::result::Result<bool, StoreError> {
        Ok(false)
    }

    async fn scan(
        &self,
        _pattern: &str,
    ) -> std::result::Result<BoxStream<'static, String>, StoreError> {
        Ok(Box::pin(futures::stream::empty()))
    }
}

/// Records every conversation and answers `"reply {n}"`.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChat {
    conversations: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
}

impl ScriptedChat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages received by each call, in call order.
    pub fn conversations(&self) -> Vec<Vec<ChatMessage>> {
        self.conversations.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerationBackend for ScriptedChat {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        self.chat(&[ChatMessage::user(prompt)]).await
    }

    async fn chat(&self, messages: &[ChatMessage]) -> std::result::Result<String, BackendError> {
        let mut conversations = self
            .conversations
            .lock()
            .map_err(|_| BackendError::EmptyResponse)?;
        conversations.push(messages.to_vec());
        Ok(format!("reply {}", conversations.len()))
    }
}

/// Counts how many backend calls are in flight at once.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of simultaneous calls observed.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerationBackend for ConcurrencyGauge {
    fn name(&self) -> &str {
        "gauge"
    }

    async fn generate(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        Ok(prompt.to_string())
    }
}
