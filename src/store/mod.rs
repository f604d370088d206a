//! Key-Value Persistence
//!
//! The engine only needs `get`, `set`, `exists` and a pattern `scan`; any
//! store offering those can back it. Two implementations ship with the
//! crate:
//!
//! - [`MemoryStore`]: process-local, for tests and one-off runs
//! - [`FileStore`]: a JSON document on disk, rewritten on every `set`
//!
//! # Key Conventions
//!
//! - `prompt:{id}:{version}` → `{ "content": <base64>, "metadata": {...} }`
//! - `embedding:{id}:{version}` → `[f32, ...]`

pub mod file;
pub mod memory;
pub mod pattern;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use crate::error::StoreError;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Prefix of stored prompt keys.
pub const PROMPT_PREFIX: &str = "prompt:";

/// Prefix of stored embedding keys.
pub const EMBEDDING_PREFIX: &str = "embedding:";

/// Minimal key-value store interface.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores `value` under `key`. The write is durable when this returns.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Returns true if `key` holds a value.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Streams keys matching a glob pattern, in key order.
    ///
    /// Fails with [`StoreError::Pattern`] if the pattern is malformed.
    async fn scan(&self, pattern: &str) -> Result<BoxStream<'static, String>, StoreError>;
}

/// Storage key of a prompt version.
pub fn prompt_key(prompt_id: &str, version_tag: &str) -> String {
    format!("{}{}:{}", PROMPT_PREFIX, prompt_id, version_tag)
}

/// Embedding key paired with a prompt key.
pub fn embedding_key_for(prompt_key: &str) -> String {
    match prompt_key.strip_prefix(PROMPT_PREFIX) {
        Some(rest) => format!("{}{}", EMBEDDING_PREFIX, rest),
        None => format!("{}{}", EMBEDDING_PREFIX, prompt_key),
    }
}

/// Prompt key paired with an embedding key.
pub fn prompt_key_for(embedding_key: &str) -> String {
    match embedding_key.strip_prefix(EMBEDDING_PREFIX) {
        Some(rest) => format!("{}{}", PROMPT_PREFIX, rest),
        None => embedding_key.to_string(),
    }
}
