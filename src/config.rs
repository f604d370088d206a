//! Application Settings
//!
//! Settings come from three layers, later layers winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML settings file
//! 3. environment variables (optionally loaded from `.env` files)
//!
//! # Example YAML Format
//!
//! ```yaml
//! catalog_path: prompt-modules.yaml
//! store_path: .promptflow/store.json
//! batch_concurrency: 8
//! run_timeout_secs: 600
//! backends:
//!   ollama_host: 127.0.0.1
//!   ollama_model: gemma:2b
//! routing:
//!   rules:
//!     - match: { category: validation }
//!       capability: remote_generation_secondary
//! ```

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execution::router::RoutingTable;

/// Environment files read at startup, in order. Missing files are skipped.
pub const ENV_FILES: &[&str] = &[".env.development.local", ".env"];

/// Connection settings for generation and embedding backends.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BackendSettings {
    pub openai_base_url: String,
    pub openai_model: String,
    #[serde(skip)]
    pub openai_api_key: Option<String>,

    pub gemini_base_url: String,
    pub gemini_model: String,
    #[serde(skip)]
    pub gemini_api_key: Option<String>,

    /// Host name, or a full `http://` URL
    pub ollama_host: String,
    pub ollama_port: u16,
    pub ollama_model: String,
    pub embedding_model: String,

    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-3.5-turbo".to_string(),
            openai_api_key: None,
            gemini_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            gemini_model: "gemini-1.5-flash".to_string(),
            gemini_api_key: None,
            ollama_host: "127.0.0.1".to_string(),
            ollama_port: 11434,
            ollama_model: "gemma:2b".to_string(),
            embedding_model: "all-minilm".to_string(),
            request_timeout_secs: 120,
        }
    }
}

impl BackendSettings {
    /// Base URL of the Ollama server.
    pub fn ollama_url(&self) -> String {
        let host = self.ollama_host.trim().trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}:{}", host, self.ollama_port)
        }
    }
}

/// Top-level settings.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Settings {
    /// Prompt module catalog file
    pub catalog_path: PathBuf,

    /// JSON file backing the key-value store
    pub store_path: PathBuf,

    /// Maximum concurrent requests in a batch run
    pub batch_concurrency: usize,

    /// Caller-level timeout for a whole workflow run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,

    pub backends: BackendSettings,

    /// Workflow routing rules
    pub routing: RoutingTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("prompt-modules.yaml"),
            store_path: PathBuf::from(".promptflow/store.json"),
            batch_concurrency: num_cpus::get(),
            run_timeout_secs: None,
            backends: BackendSettings::default(),
            routing: RoutingTable::default(),
        }
    }
}

impl Settings {
    /// Loads settings from an optional YAML file, then applies the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        load_env_files();

        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        settings.apply_env(|key| env::var(key).ok());
        debug!("Effective settings: {:?}", settings.redacted());
        Ok(settings)
    }

    /// Parses a YAML settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
            path: path.display().to_string(),
            reason: format!("failed to read settings file: {}", e),
        })?;

        let settings: Self = serde_yaml::from_str(&content).map_err(|e| Error::Configuration {
            path: path.display().to_string(),
            reason: format!("failed to parse settings YAML: {}", e),
        })?;

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Applies environment overrides through a lookup function.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.backends.openai_api_key = Some(key);
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.backends.gemini_api_key = Some(key);
        }
        if let Some(host) = non_empty("OLLAMA_HOST") {
            self.backends.ollama_host = host;
        }
        if let Some(path) = non_empty("PROMPTFLOW_CATALOG") {
            self.catalog_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty("PROMPTFLOW_STORE") {
            self.store_path = PathBuf::from(path);
        }
    }

    /// Copy with credentials masked, for logging.
    fn redacted(&self) -> Self {
        let mut copy = self.clone();
        let mask = |key: &mut Option<String>| {
            if key.is_some() {
                *key = Some("***".to_string());
            }
        };
        mask(&mut copy.backends.openai_api_key);
        mask(&mut copy.backends.gemini_api_key);
        copy
    }
}

/// Loads `.env` style files into the process environment.
pub fn load_env_files() {
    for file in ENV_FILES {
        if let Ok(path) = dotenvy::from_filename(file) {
            info!("Loaded environment from {}", path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::router::BackendCapability;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.catalog_path, PathBuf::from("prompt-modules.yaml"));
        assert!(settings.batch_concurrency >= 1);
        assert!(settings.run_timeout_secs.is_none());
        assert_eq!(settings.backends.ollama_url(), "http://127.0.0.1:11434");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("OPENAI_API_KEY", "sk-test"),
            ("OLLAMA_HOST", "ollama.internal"),
            ("PROMPTFLOW_CATALOG", "/etc/modules.yaml"),
            ("GEMINI_API_KEY", "  "),
        ]
        .into_iter()
        .collect();

        let mut settings = Settings::default();
        settings.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.backends.openai_api_key.as_deref(), Some("sk-test"));
        assert!(settings.backends.gemini_api_key.is_none());
        assert_eq!(settings.backends.ollama_url(), "http://ollama.internal:11434");
        assert_eq!(settings.catalog_path, PathBuf::from("/etc/modules.yaml"));
    }

    #[test]
    fn test_ollama_host_with_scheme() {
        let mut backends = BackendSettings::default();
        backends.ollama_host = "https://llm.example.com/".to_string();
        assert_eq!(backends.ollama_url(), "https://llm.example.com");
    }

    #[test]
    fn test_from_file_partial_yaml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("promptflow.yaml");
        std::fs::write(
            &path,
            r#"
catalog_path: modules.yaml
run_timeout_secs: 30
backends:
  ollama_model: llama3
routing:
  rules:
    - match: { category: logic }
      capability: remote_generation_primary
"#,
        )
        .unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.catalog_path, PathBuf::from("modules.yaml"));
        assert_eq!(settings.run_timeout_secs, Some(30));
        assert_eq!(settings.backends.ollama_model, "llama3");
        assert_eq!(settings.backends.openai_model, "gpt-3.5-turbo");
        assert_eq!(
            settings.routing.route("logic__x__v1"),
            BackendCapability::RemoteGenerationPrimary
        );
    }

    #[test]
    fn test_from_file_missing() {
        let result = Settings::from_file(Path::new("/nonexistent/promptflow.yaml"));
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }

    #[test]
    fn test_redacted_masks_keys() {
        let mut settings = Settings::default();
        settings.backends.openai_api_key = Some("sk-secret".to_string());
        let redacted = settings.redacted();
        assert_eq!(redacted.backends.openai_api_key.as_deref(), Some("***"));
    }
}
