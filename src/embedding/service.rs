//! Store-backed embedding service.

use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;

use super::{cosine_similarity, normalize, Embedder, EmbeddingService};
use crate::error::{Error, Result};
use crate::registry::decode_record;
use crate::store::{
    embedding_key_for, prompt_key_for, KeyValueStore, EMBEDDING_PREFIX, PROMPT_PREFIX,
};

/// A stored prompt matched by a search.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub prompt_key: String,
    pub score: f32,
}

/// Outcome of a backfill pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub generated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Embeds prompts read from a key-value store and writes the vectors back.
pub struct StoreEmbeddingService<E> {
    store: Arc<dyn KeyValueStore>,
    embedder: E,
}

impl<E: Embedder> StoreEmbeddingService<E> {
    pub fn new(store: Arc<dyn KeyValueStore>, embedder: E) -> Self {
        Self { store, embedder }
    }

    /// Embeds every stored prompt that has no embedding yet.
    ///
    /// A prompt that fails to embed is logged and skipped; the pass
    /// continues with the next key.
    pub async fn backfill(&self) -> Result<BackfillReport> {
        let pattern = format!("{}*", PROMPT_PREFIX);
        let keys: Vec<String> = self
            .store
            .scan(&pattern)
            .await
            .map_err(|e| Error::persistence(&pattern, e))?
            .collect()
            .await;

        info!("Found {} stored prompts", keys.len());
        let mut report = BackfillReport::default();

        for key in keys {
            let embedding_key = embedding_key_for(&key);
            let exists = self
                .store
                .exists(&embedding_key)
                .await
                .map_err(|e| Error::persistence(&embedding_key, e))?;

            if exists {
                debug!("Embedding exists for {}, skipping", key);
                report.skipped += 1;
                continue;
            }

            match self.embed_for_key(&key).await {
                Ok(()) => report.generated += 1,
                Err(e) => {
                    warn!("Could not embed {}: {}", key, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Backfill finished: {} generated, {} skipped, {} failed",
            report.generated, report.skipped, report.failed
        );
        Ok(report)
    }

    /// Finds the stored prompts most similar to `query`, best first.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(Error::Validation("search query is empty".to_string()));
        }

        let query_vector = self
            .embedder
            .embed(query)
            .await
            .map(normalize)
            .map_err(|e| Error::Embedding {
                key: "query".to_string(),
                reason: e.to_string(),
            })?;

        let pattern = format!("{}*", EMBEDDING_PREFIX);
        let keys: Vec<String> = self
            .store
            .scan(&pattern)
            .await
            .map_err(|e| Error::persistence(&pattern, e))?
            .collect()
            .await;

        let mut hits = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(value) = self
                .store
                .get(&key)
                .await
                .map_err(|e| Error::persistence(&key, e))?
            else {
                continue;
            };

            let vector: Vec<f32> = match serde_json::from_value(value) {
                Ok(vector) => vector,
                Err(e) => {
                    warn!("Ignoring malformed embedding {}: {}", key, e);
                    continue;
                }
            };

            hits.push(SearchHit {
                prompt_key: prompt_key_for(&key),
                score: cosine_similarity(&query_vector, &vector),
            });
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}

#[async_trait]
impl<E: Embedder> EmbeddingService for StoreEmbeddingService<E> {
    async fn embed_for_key(&self, storage_key: &str) -> Result<()> {
        let record = self
            .store
            .get(storage_key)
            .await
            .map_err(|e| Error::persistence(storage_key, e))?
            .ok_or_else(|| Error::Embedding {
                key: storage_key.to_string(),
                reason: "no stored prompt under this key".to_string(),
            })?;

        let prompt = decode_record(storage_key, &record)?;

        let vector = self
            .embedder
            .embed(&prompt.content)
            .await
            .map_err(|e| Error::Embedding {
                key: storage_key.to_string(),
                reason: e.to_string(),
            })?;

        let embedding_key = embedding_key_for(storage_key);
        self.store
            .set(&embedding_key, Value::from(normalize(vector)))
            .await
            .map_err(|e| Error::persistence(&embedding_key, e))?;

        debug!("Stored embedding {}", embedding_key);
        Ok(())
    }
}

impl<E> std::fmt::Debug for StoreEmbeddingService<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEmbeddingService").finish_non_exhaustive()
    }
}
