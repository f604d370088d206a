//! Workflow Context
//!
//! The state accumulated by one workflow execution. It is seeded with the
//! caller's initial input and gains one entry per executed step, keyed by
//! module id. Entries are append-only: when a module id repeats, both
//! outputs are kept (distinguished by step index) and lookups by id return
//! the latest.
//!
//! A context belongs to exactly one run and is dropped when the run ends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Key of the seeded initial input entry.
pub const INITIAL_INPUT_KEY: &str = "initialInput";

/// A value held in the context.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ContextValue {
    /// Plain text, the usual step output
    Text(String),
    /// Structured data supplied by a caller
    Json(Value),
    /// Backend output that parses as JSON; `raw` is the text as returned
    Parsed { raw: String, value: Value },
    /// A persisted artifact
    ArtifactRef { id: String, storage_key: String },
}

impl ContextValue {
    /// Wraps backend output. JSON objects and arrays are also kept parsed,
    /// next to the unchanged text.
    pub fn from_output(text: String) -> Self {
        let trimmed = text.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str::<Value>(&text) {
                return Self::Parsed { raw: text, value };
            }
        }
        Self::Text(text)
    }

    /// Structured form, if the value has one.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) | Self::Parsed { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Text form used for template substitution.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(Value::String(text)) => text.clone(),
            Self::Json(value) => value.to_string(),
            Self::Parsed { raw, .. } => raw.clone(),
            Self::ArtifactRef { storage_key, .. } => storage_key.clone(),
        }
    }

    /// JSON form used when the whole context is serialized.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Text(text) => Value::String(text.clone()),
            Self::Json(value) | Self::Parsed { value, .. } => value.clone(),
            Self::ArtifactRef { id, storage_key } => json!({
                "artifactId": id,
                "storageKey": storage_key,
            }),
        }
    }
}

impl From<String> for ContextValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ContextValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Value> for ContextValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// One recorded value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ContextEntry {
    pub key: String,

    /// Index of the step that produced it; `None` for the initial input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,

    pub value: ContextValue,
}

/// Append-only mapping of keys to step outputs for one run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct WorkflowContext {
    entries: Vec<ContextEntry>,
}

impl WorkflowContext {
    /// Creates a context seeded with the initial input.
    pub fn new(initial_input: impl Into<ContextValue>) -> Self {
        Self {
            entries: vec![ContextEntry {
                key: INITIAL_INPUT_KEY.to_string(),
                step_index: None,
                value: initial_input.into(),
            }],
        }
    }

    /// Returns the seeded initial input.
    pub fn initial_input(&self) -> &ContextValue {
        // The seed entry is created in `new` and never removed
        &self.entries[0].value
    }

    /// Appends a step output.
    pub fn record(&mut self, module_id: &str, step_index: usize, value: ContextValue) {
        self.entries.push(ContextEntry {
            key: module_id.to_string(),
            step_index: Some(step_index),
            value,
        });
    }

    /// Latest value recorded under `key`.
    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    /// Every value recorded under `key`, oldest first.
    pub fn get_all(&self, key: &str) -> Vec<&ContextValue> {
        self.entries
            .iter()
            .filter(|entry| entry.key == key)
            .map(|entry| &entry.value)
            .collect()
    }

    /// The entry produced by a specific step.
    pub fn entry_at(&self, step_index: usize) -> Option<&ContextEntry> {
        self.entries
            .iter()
            .find(|entry| entry.step_index == Some(step_index))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    /// All entries in insertion order, initial input first.
    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    /// Number of entries produced by steps (excludes the initial input).
    pub fn step_count(&self) -> usize {
        self.entries.len() - 1
    }

    /// Total number of entries including the initial input.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the initial input is present from construction.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Latest value per key as text, for template substitution.
    pub fn text_values(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.value.as_text()))
            .collect()
    }

    /// Latest value per key as a JSON object.
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for entry in &self.entries {
            map.insert(entry.key.clone(), entry.value.to_json());
        }
        Value::Object(map)
    }

    /// Pretty JSON of the whole context, used as input by steps that
    /// consume accumulated state.
    pub fn serialize_for_prompt(&self) -> String {
        serde_json::to_string_pretty(&self.to_json()).unwrap_or_else(|_| self.to_json().to_string())
    }
}
