//! Prompt Registry
//!
//! Stores versioned prompts in the key-value store. Each version lives
//! under `prompt:{id}:{version}` as
//!
//! ```json
//! { "content": "<base64>", "metadata": { ... } }
//! ```
//!
//! Artifacts produced by workflow assembly use the same layout, so they can
//! be fetched, run and searched like any registered prompt.

use std::sync::Arc;

use base64::prelude::*;
use log::{debug, info};
use serde_json::{json, Map, Value};

use crate::catalog::ExecutionMode;
use crate::error::{Error, Result};
use crate::store::{prompt_key, KeyValueStore};

/// Version used when none is given.
pub const DEFAULT_VERSION: &str = "v1.0.0";

/// A decoded prompt version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPrompt {
    pub key: String,
    pub content: String,
    pub metadata: Value,
}

impl StoredPrompt {
    /// Declared execution mode, read from `metadata.execution_mode`.
    pub fn execution_mode(&self) -> Option<ExecutionMode> {
        self.metadata
            .get("execution_mode")
            .and_then(Value::as_str)
            .map(ExecutionMode::from_tag)
    }
}

/// Builds the stored record for a prompt version.
pub fn encode_record(content: &str, metadata: Value) -> Value {
    json!({
        "content": BASE64_STANDARD.encode(content.as_bytes()),
        "metadata": metadata,
    })
}

/// Decodes a stored record read from `key`.
pub fn decode_record(key: &str, record: &Value) -> Result<StoredPrompt> {
    let parse_error = |reason: String| Error::Parse {
        what: format!("stored prompt '{}'", key),
        reason,
    };

    let encoded = record
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_error("missing content field".to_string()))?;

    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| parse_error(format!("invalid base64 content: {}", e)))?;

    let content =
        String::from_utf8(bytes).map_err(|e| parse_error(format!("content is not UTF-8: {}", e)))?;

    Ok(StoredPrompt {
        key: key.to_string(),
        content,
        metadata: record
            .get("metadata")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
    })
}

/// Registers and fetches versioned prompts.
#[derive(Clone)]
pub struct PromptRegistry {
    store: Arc<dyn KeyValueStore>,
}

impl PromptRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Stores a prompt version and returns its storage key.
    ///
    /// An existing version under the same key is replaced.
    pub async fn register(
        &self,
        prompt_id: &str,
        content: &str,
        version_tag: Option<&str>,
        metadata: Value,
    ) -> Result<String> {
        let prompt_id = prompt_id.trim();
        if prompt_id.is_empty() {
            return Err(Error::Validation("prompt id is required".to_string()));
        }
        if content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "prompt '{}' has empty content",
                prompt_id
            )));
        }

        let version = version_tag
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VERSION);
        let key = prompt_key(prompt_id, version);

        self.store
            .set(&key, encode_record(content, metadata))
            .await
            .map_err(|e| Error::persistence(&key, e))?;

        info!("Registered prompt {}", key);
        Ok(key)
    }

    /// Fetches a prompt version, or `None` if it was never registered.
    pub async fn fetch(&self, prompt_id: &str, version_tag: &str) -> Result<Option<StoredPrompt>> {
        let key = prompt_key(prompt_id.trim(), version_tag.trim());
        self.fetch_key(&key).await
    }

    /// Fetches a prompt by its full storage key.
    pub async fn fetch_key(&self, key: &str) -> Result<Option<StoredPrompt>> {
        let record = self
            .store
            .get(key)
            .await
            .map_err(|e| Error::persistence(key, e))?;

        match record {
            Some(record) => {
                debug!("Fetched {}", key);
                decode_record(key, &record).map(Some)
            }
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for PromptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn registry() -> (PromptRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (PromptRegistry::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_register_and_fetch() {
        let (registry, store) = registry();
        let key = registry
            .register(
                "hello-world",
                "Hello {{name}}",
                None,
                json!({"execution_mode": "local_llm"}),
            )
            .await
            .unwrap();

        assert_eq!(key, "prompt:hello-world:v1.0.0");

        let raw = store.get(&key).await.unwrap().unwrap();
        assert_eq!(raw["content"], json!(BASE64_STANDARD.encode("Hello {{name}}")));

        let prompt = registry.fetch("hello-world", "v1.0.0").await.unwrap().unwrap();
        assert_eq!(prompt.content, "Hello {{name}}");
        assert_eq!(prompt.execution_mode(), Some(ExecutionMode::LocalLlm));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (registry, _) = registry();

        let err = registry.register(" ", "x", None, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = registry.register("p", "  ", None, json!({})).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_fetch_missing_version() {
        let (registry, _) = registry();
        registry.register("p", "text", Some("v2.0.0"), json!({})).await.unwrap();

        assert!(registry.fetch("p", "v1.0.0").await.unwrap().is_none());
        assert!(registry.fetch("p", "v2.0.0").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_fetch_corrupt_content() {
        let (registry, store) = registry();
        store
            .set("prompt:bad:v1.0.0", json!({"content": "%%% not base64"}))
            .await
            .unwrap();

        let err = registry.fetch("bad", "v1.0.0").await.unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn test_decode_without_metadata() {
        let record = json!({"content": BASE64_STANDARD.encode("x")});
        let prompt = decode_record("prompt:x:v1", &record).unwrap();
        assert_eq!(prompt.metadata, json!({}));
        assert!(prompt.execution_mode().is_none());
    }

    #[test]
    fn test_unknown_mode_is_passthrough() {
        let prompt = StoredPrompt {
            key: "prompt:x:v1".to_string(),
            content: "x".to_string(),
            metadata: json!({"execution_mode": "template_only"}),
        };
        assert_eq!(prompt.execution_mode(), Some(ExecutionMode::Passthrough));
    }
}
