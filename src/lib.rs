//! PromptFlow - Prompt Module Workflow Engine
//!
//! Manages reusable prompt modules and runs them as ordered pipelines
//! against pluggable text-generation backends. Each step's output is
//! threaded into the next step and accumulated in a per-run context; a
//! finished run can be assembled into a new stored prompt.
//!
//! # Architecture
//!
//! - [`catalog`]: Prompt modules and the load-once module catalog
//! - [`workflow`]: Workflow definitions, run context and run state
//! - [`execution`]: Engine, template rendering, routing, assembly, single runs
//! - [`backend`]: Text-generation backends (OpenAI, Gemini, Ollama)
//! - [`store`]: Key-value persistence (in-memory and JSON file)
//! - [`registry`]: Versioned prompt storage
//! - [`embedding`]: Prompt embeddings and similarity search
//! - [`chat`]: Agent conversations over stored prompts
//! - [`manifest`]: Manifest export of stored prompts
//! - [`monitoring`]: Per-run step timeline
//! - [`config`]: Settings from YAML and the environment
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use promptflow::backend::BackendSet;
//! use promptflow::catalog::{ModuleCatalog, YamlFileSource};
//! use promptflow::config::Settings;
//! use promptflow::execution::{ResultSelector, WorkflowEngine};
//! use promptflow::workflow::load_definition;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load(None)?;
//!
//!     // Load the module catalog once and share it
//!     let catalog = Arc::new(ModuleCatalog::new(YamlFileSource::new(&settings.catalog_path)));
//!     catalog.load_all();
//!
//!     let backends = BackendSet::from_settings(&settings.backends)?;
//!     let engine = WorkflowEngine::new(catalog, backends);
//!
//!     // Run a workflow and print every step's output
//!     let definition = load_definition("prompt-builder.yaml")?;
//!     let output = engine
//!         .run(&definition, "A haiku about rust", ResultSelector::StepLog)
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod chat;
pub mod config;
pub mod embedding;
pub mod error;
pub mod execution;
pub mod manifest;
pub mod monitoring;
pub mod registry;
pub mod store;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use catalog::{Module, ModuleCatalog};
pub use error::{Error, Result};
pub use execution::{ResultSelector, RunOutput, WorkflowEngine};
pub use workflow::{load_definition, WorkflowContext, WorkflowDefinition};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "PromptFlow";
