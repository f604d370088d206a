//! Manifest Export
//!
//! Turns a stored prompt version into a GPTs-style JSON manifest that other
//! tools can import: name, description, instructions, version and author.

use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::registry::{PromptRegistry, StoredPrompt};

/// Directory manifests are written to by default.
pub const DEFAULT_MANIFEST_DIR: &str = "gpts-manifest";

/// Description used when the prompt metadata has none.
pub const NO_DESCRIPTION: &str = "No description";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    pub name: String,
    pub description: String,
    pub instructions: String,
    pub version: String,
    pub author: String,
}

impl Manifest {
    /// Builds a manifest from a decoded prompt.
    pub fn from_prompt(
        prompt_id: &str,
        version_tag: &str,
        prompt: &StoredPrompt,
        author: &str,
    ) -> Self {
        let description = prompt
            .metadata
            .get("description")
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .unwrap_or(NO_DESCRIPTION);

        Self {
            name: prompt_id.to_string(),
            description: description.to_string(),
            instructions: prompt.content.clone(),
            version: version_tag.to_string(),
            author: author.to_string(),
        }
    }

    /// File name used inside the output directory.
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.name, self.version)
    }
}

/// Fetches a prompt version and builds its manifest.
pub async fn export_manifest(
    registry: &PromptRegistry,
    prompt_id: &str,
    version_tag: &str,
    author: &str,
) -> Result<Manifest> {
    let prompt = registry
        .fetch(prompt_id, version_tag)
        .await?
        .ok_or_else(|| Error::Lookup(format!("{}:{}", prompt_id, version_tag)))?;

    Ok(Manifest::from_prompt(prompt_id, version_tag, &prompt, author))
}

/// Writes a manifest as pretty JSON, creating `dir` if needed.
pub async fn write_manifest(manifest: &Manifest, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(manifest.file_name());
    let key = path.display().to_string();

    let json = serde_json::to_string_pretty(manifest).map_err(|e| Error::persistence(&key, e))?;
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| Error::persistence(&key, e))?;
    tokio::fs::write(&path, json)
        .await
        .map_err(|e| Error::persistence(&key, e))?;

    info!("Wrote manifest {}", path.display());
    Ok(path)
}
