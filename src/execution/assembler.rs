//! Artifact Assembly
//!
//! The terminal step of a workflow that builds something new: it takes the
//! designated content entry from the context, merges any generated tags into
//! the metadata, stores the result as a new prompt version and asks the
//! embedding service to index it.
//!
//! Only two failures are recovered here. Tags that cannot be parsed leave
//! the base metadata in place, and an embedding failure after the artifact
//! was stored is reported in the receipt instead of failing the run.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::embedding::EmbeddingService;
use crate::error::{Error, Result};
use crate::registry::{encode_record, DEFAULT_VERSION};
use crate::store::{prompt_key, KeyValueStore};
use crate::workflow::context::{ContextValue, WorkflowContext};

/// Context key holding generated tags unless configured otherwise.
pub const DEFAULT_TAGS_KEY: &str = "meta__auto_tag__v1";

/// Prefix of generated artifact ids.
pub const ARTIFACT_ID_PREFIX: &str = "generated-";

/// How an artifact is built from the context.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AssemblySettings {
    /// Entry holding the artifact content; the last executed step when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_key: Option<String>,

    /// Entry holding generated tags; `null` disables tag merging
    pub tags_key: Option<String>,

    pub version_tag: String,

    /// Extra metadata merged over the defaults
    pub base_metadata: Map<String, Value>,
}

impl Default for AssemblySettings {
    fn default() -> Self {
        Self {
            content_key: None,
            tags_key: Some(DEFAULT_TAGS_KEY.to_string()),
            version_tag: DEFAULT_VERSION.to_string(),
            base_metadata: Map::new(),
        }
    }
}

impl AssemblySettings {
    pub fn with_content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = Some(key.into());
        self
    }

    pub fn with_tags_key(mut self, key: Option<String>) -> Self {
        self.tags_key = key;
        self
    }

    pub fn with_version(mut self, version_tag: impl Into<String>) -> Self {
        self.version_tag = version_tag.into();
        self
    }
}

/// A newly assembled prompt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub content: String,
    pub version_tag: String,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// What assembly produced and where it was stored.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArtifactReceipt {
    pub artifact: Artifact,
    pub storage_key: String,
    /// False when the artifact was stored but could not be embedded
    pub embedded: bool,
}

impl ArtifactReceipt {
    /// Context value pointing at the stored artifact.
    pub fn reference(&self) -> ContextValue {
        ContextValue::ArtifactRef {
            id: self.artifact.id.clone(),
            storage_key: self.storage_key.clone(),
        }
    }
}

/// Builds, persists and embeds artifacts.
#[derive(Clone)]
pub struct ArtifactAssembler {
    store: Arc<dyn KeyValueStore>,
    embeddings: Arc<dyn EmbeddingService>,
}

impl ArtifactAssembler {
    pub fn new(store: Arc<dyn KeyValueStore>, embeddings: Arc<dyn EmbeddingService>) -> Self {
        Self { store, embeddings }
    }

    /// Assembles an artifact from a finished run's context.
    ///
    /// Nothing is written when the content entry is missing or empty.
    pub async fn assemble(
        &self,
        context: &WorkflowContext,
        settings: &AssemblySettings,
        workflow_name: &str,
    ) -> Result<ArtifactReceipt> {
        let content_key = resolve_content_key(context, settings)?;
        let content = context
            .get(&content_key)
            .map(ContextValue::as_text)
            .ok_or_else(|| {
                Error::Validation(format!(
                    "content entry '{}' not found in workflow context",
                    content_key
                ))
            })?;

        if content.trim().is_empty() {
            return Err(Error::Validation(format!(
                "content entry '{}' is empty",
                content_key
            )));
        }

        let created_at = Utc::now();
        let mut metadata = Map::new();
        metadata.insert("source".to_string(), json!("workflow"));
        metadata.insert("workflow".to_string(), json!(workflow_name));
        metadata.insert("content_key".to_string(), json!(content_key));
        metadata.insert("created_at".to_string(), json!(created_at.to_rfc3339()));
        for (key, value) in &settings.base_metadata {
            metadata.insert(key.clone(), value.clone());
        }

        if let Some(tags_key) = &settings.tags_key {
            if let Some(tags) = context.get(tags_key) {
                merge_tags(&mut metadata, tags, tags_key);
            }
        }

        let artifact = Artifact {
            id: generate_artifact_id(),
            content,
            version_tag: settings.version_tag.clone(),
            metadata: Value::Object(metadata),
            created_at,
        };

        let storage_key = prompt_key(&artifact.id, &artifact.version_tag);
        self.store
            .set(
                &storage_key,
                encode_record(&artifact.content, artifact.metadata.clone()),
            )
            .await
            .map_err(|e| Error::persistence(&storage_key, e))?;

        info!("Stored artifact {}", storage_key);

        let embedded = match self.embeddings.embed_for_key(&storage_key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Artifact {} stored but not embedded: {}", storage_key, e);
                false
            }
        };

        Ok(ArtifactReceipt {
            artifact,
            storage_key,
            embedded,
        })
    }
}

impl std::fmt::Debug for ArtifactAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactAssembler").finish_non_exhaustive()
    }
}

/// Returns a fresh `generated-xxxxxxxx` id.
pub fn generate_artifact_id() -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}{}", ARTIFACT_ID_PREFIX, &uuid[..8])
}

fn resolve_content_key(context: &WorkflowContext, settings: &AssemblySettings) -> Result<String> {
    if let Some(key) = &settings.content_key {
        return Ok(key.clone());
    }

    context
        .entries()
        .iter()
        .rev()
        .find(|entry| entry.step_index.is_some())
        .map(|entry| entry.key.clone())
        .ok_or_else(|| Error::Validation("no step output to assemble from".to_string()))
}

fn merge_tags(metadata: &mut Map<String, Value>, tags: &ContextValue, tags_key: &str) {
    let parsed = match tags.as_json() {
        Some(value) => Ok(value.clone()),
        None => serde_json::from_str::<Value>(strip_code_fence(&tags.as_text())),
    };

    match parsed {
        Ok(Value::Object(fields)) => {
            for (key, value) in fields {
                metadata.insert(key, value);
            }
        }
        Ok(Value::Array(items)) => {
            metadata.insert("tags".to_string(), Value::Array(items));
        }
        Ok(other) => {
            warn!(
                "Tags in '{}' are neither an object nor a list ({}), using base metadata",
                tags_key, other
            );
        }
        Err(e) => {
            warn!(
                "Could not parse tags in '{}': {}, using base metadata",
                tags_key, e
            );
        }
    }
}

/// Removes a surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag line
    let body = match rest.find('\n') {
        Some(index) => &rest[index + 1..],
        None => rest,
    };

    body.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::decode_record;
    use crate::store::MemoryStore;
    use crate::testing::{FailingStore, RecordingEmbeddings};

    fn assembler() -> (ArtifactAssembler, Arc<MemoryStore>, Arc<RecordingEmbeddings>) {
        let store = Arc::new(MemoryStore::new());
        let embeddings = Arc::new(RecordingEmbeddings::new());
        (
            ArtifactAssembler::new(store.clone(), embeddings.clone()),
            store,
            embeddings,
        )
    }

    fn finished_context() -> WorkflowContext {
        let mut context = WorkflowContext::new("idea");
        context.record("logic__optimize_expression__v1", 0, "Final prompt".into());
        context
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("```\n[1]\n```\n"), "[1]");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
    }

    #[test]
    fn test_generate_artifact_id() {
        let id = generate_artifact_id();
        assert!(id.starts_with("generated-"));
        assert_eq!(id.len(), "generated-".len() + 8);
        assert!(id["generated-".len()..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_artifact_id());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = AssemblySettings::default();
        assert!(settings.content_key.is_none());
        assert_eq!(settings.tags_key.as_deref(), Some(DEFAULT_TAGS_KEY));
        assert_eq!(settings.version_tag, "v1.0.0");
    }

    #[tokio::test]
    async fn test_assemble_persists_and_embeds() {
        let (assembler, store, embeddings) = assembler();
        let mut context = finished_context();
        context.record(
            DEFAULT_TAGS_KEY,
            1,
            "```json\n{\"domain\": \"writing\"}\n```".into(),
        );

        let settings = AssemblySettings::default().with_content_key("logic__optimize_expression__v1");
        let receipt = assembler
            .assemble(&context, &settings, "builder")
            .await
            .unwrap();

        assert!(receipt.embedded);
        assert_eq!(
            receipt.storage_key,
            format!("prompt:{}:v1.0.0", receipt.artifact.id)
        );
        assert_eq!(embeddings.calls(), vec![receipt.storage_key.clone()]);

        let record = store.get(&receipt.storage_key).await.unwrap().unwrap();
        let stored = decode_record(&receipt.storage_key, &record).unwrap();
        assert_eq!(stored.content, "Final prompt");
        assert_eq!(stored.metadata["source"], "workflow");
        assert_eq!(stored.metadata["workflow"], "builder");
        assert_eq!(stored.metadata["domain"], "writing");
    }

    #[tokio::test]
    async fn test_content_key_defaults_to_last_step() {
        let (assembler, _, _) = assembler();
        let mut context = finished_context();
        context.record("export__final__v1", 1, "Exported".into());

        let receipt = assembler
            .assemble(&context, &AssemblySettings::default(), "wf")
            .await
            .unwrap();
        assert_eq!(receipt.artifact.content, "Exported");
        assert_eq!(receipt.artifact.metadata["content_key"], "export__final__v1");
    }

    #[tokio::test]
    async fn test_missing_content_writes_nothing() {
        let (assembler, store, embeddings) = assembler();
        let settings = AssemblySettings::default().with_content_key("logic__missing__v1");

        let err = assembler
            .assemble(&finished_context(), &settings, "wf")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty().await);
        assert!(embeddings.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_tags_keep_base_metadata() {
        let (assembler, store, _) = assembler();
        let mut context = finished_context();
        context.record(DEFAULT_TAGS_KEY, 1, "tags: not json".into());

        let settings = AssemblySettings::default().with_content_key("logic__optimize_expression__v1");
        let receipt = assembler.assemble(&context, &settings, "wf").await.unwrap();

        let metadata = receipt.artifact.metadata.as_object().unwrap();
        assert_eq!(metadata["source"], "workflow");
        assert!(!metadata.contains_key("tags"));
        assert!(store.exists(&receipt.storage_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_tag_list_stored_under_tags() {
        let (assembler, _, _) = assembler();
        let mut context = finished_context();
        context.record(
            DEFAULT_TAGS_KEY,
            1,
            ContextValue::from_output(r#"["a", "b"]"#.to_string()),
        );

        let settings = AssemblySettings::default().with_content_key("logic__optimize_expression__v1");
        let receipt = assembler.assemble(&context, &settings, "wf").await.unwrap();
        assert_eq!(receipt.artifact.metadata["tags"], json!(["a", "b"]));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let embeddings = Arc::new(RecordingEmbeddings::failing());
        let assembler = ArtifactAssembler::new(store.clone(), embeddings);

        let receipt = assembler
            .assemble(&finished_context(), &AssemblySettings::default(), "wf")
            .await
            .unwrap();

        assert!(!receipt.embedded);
        assert!(store.exists(&receipt.storage_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence_failure_skips_embedding() {
        let embeddings = Arc::new(RecordingEmbeddings::new());
        let assembler = ArtifactAssembler::new(Arc::new(FailingStore), embeddings.clone());

        let err = assembler
            .assemble(&finished_context(), &AssemblySettings::default(), "wf")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence { .. }));
        assert!(embeddings.calls().is_empty());
    }

    #[test]
    fn test_receipt_reference() {
        let receipt = ArtifactReceipt {
            artifact: Artifact {
                id: "generated-0000abcd".to_string(),
                content: "x".to_string(),
                version_tag: "v1.0.0".to_string(),
                metadata: json!({}),
                created_at: Utc::now(),
            },
            storage_key: "prompt:generated-0000abcd:v1.0.0".to_string(),
            embedded: true,
        };
        assert_eq!(
            receipt.reference(),
            ContextValue::ArtifactRef {
                id: "generated-0000abcd".to_string(),
                storage_key: "prompt:generated-0000abcd:v1.0.0".to_string(),
            }
        );
    }
}
