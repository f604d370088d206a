//! In-memory key-value store.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde_json::Value;
use tokio::sync::RwLock;

use super::pattern::KeyPattern;
use super::KeyValueStore;
use crate::error::StoreError;

/// Process-local store. Keys are kept sorted so scans are deterministic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn scan(&self, pattern: &str) -> Result<BoxStream<'static, String>, StoreError> {
        let pattern = KeyPattern::new(pattern)?;
        let keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| pattern.matches(key))
            .cloned()
            .collect();

        Ok(stream::iter(keys).boxed())
    }
}
