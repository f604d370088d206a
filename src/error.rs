//! Error Types
//!
//! One taxonomy for the whole crate. Workflow runs surface the first fatal
//! error and stop; the only locally recovered kinds are malformed tag
//! payloads during assembly and an unreadable module catalog.

use std::time::Duration;

use thiserror::Error;

use crate::execution::router::BackendCapability;

/// Errors raised by text-generation backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Transport-level failure talking to the service.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("service returned {status}: {message}")]
    Api { status: u16, message: String },

    /// A required API key or host is not set.
    #[error("missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// The service answered but produced no text.
    #[error("service returned an empty response")]
    EmptyResponse,

    /// No backend was registered for the routed capability.
    #[error("no backend configured for {0}")]
    NotConfigured(BackendCapability),
}

/// Errors raised by key-value store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid key pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Module catalog or settings could not be read or parsed.
    #[error("configuration error in '{path}': {reason}")]
    Configuration { path: String, reason: String },

    /// A workflow referenced a module id the catalog does not know.
    #[error("module '{0}' not found in catalog")]
    Lookup(String),

    /// A resolved module has no prompt template.
    #[error("module '{0}' has no prompt_template defined")]
    MissingTemplate(String),

    /// Caller input or intermediate state failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A generation backend failed while executing a module.
    #[error("backend {capability} failed for module '{module_id}'")]
    Backend {
        module_id: String,
        capability: BackendCapability,
        #[source]
        source: BackendError,
    },

    /// Structured data could not be parsed.
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// A write or read against the key-value store failed.
    #[error("persistence failed for key '{key}'")]
    Persistence {
        key: String,
        #[source]
        source: StoreError,
    },

    /// Embedding generation failed.
    #[error("embedding failed for '{key}': {reason}")]
    Embedding { key: String, reason: String },

    /// The caller-level timeout elapsed before the run finished.
    #[error("workflow run timed out after {0:?}")]
    Timeout(Duration),

    /// A spawned batch task panicked or was cancelled.
    #[error("batch task failed: {0}")]
    Task(String),
}

impl Error {
    /// Returns the module id this error is attributed to, if any.
    pub fn module_id(&self) -> Option<&str> {
        match self {
            Self::Lookup(id) | Self::MissingTemplate(id) => Some(id),
            Self::Backend { module_id, .. } => Some(module_id),
            _ => None,
        }
    }

    pub(crate) fn persistence(key: impl Into<String>, source: impl Into<StoreError>) -> Self {
        Self::Persistence {
            key: key.into(),
            source: source.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
