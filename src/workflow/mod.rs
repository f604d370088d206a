//! Workflow Definition Module
//!
//! Provides data structures for defining workflows and for the state a
//! single run accumulates.
//!
//! # Structure
//!
//! - [`definition`]: Ordered module ids, YAML loading and validation
//! - [`context`]: Per-run accumulated step outputs
//! - [`state`]: Run state machine and step records

pub mod context;
pub mod definition;
pub mod state;

pub use context::{ContextEntry, ContextValue, WorkflowContext, INITIAL_INPUT_KEY};
pub use definition::{load_definition, parse_definition, DuplicatePolicy, WorkflowDefinition};
pub use state::{RunState, RunTracker, StepRecord};
