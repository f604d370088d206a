//! Prompt Module Catalog
//!
//! Data structures for prompt modules and the read-only catalog that
//! resolves module ids during workflow execution.
//!
//! # Structure
//!
//! - [`model`]: Module definition and execution modes
//! - [`loader`]: Catalog sources and the load-once lookup

pub mod loader;
pub mod model;

pub use loader::{ModuleCatalog, ModuleSource, StaticSource, YamlFileSource};
pub use model::{category_of, ExecutionMode, Module};
