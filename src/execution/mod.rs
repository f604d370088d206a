//! Workflow Execution Module
//!
//! Provides the sequential engine that runs workflows, together with the
//! pieces it is built from.
//!
//! # Architecture
//!
//! - [`engine`]: Runs a workflow definition step by step
//! - [`render`]: `{{key}}` template substitution
//! - [`router`]: Chooses the backend for a module
//! - [`assembler`]: Builds and stores artifacts from a finished run
//! - [`single`]: Runs single stored prompts and batches of them

pub mod assembler;
pub mod engine;
pub mod render;
pub mod router;
pub mod single;

pub use assembler::{Artifact, ArtifactAssembler, ArtifactReceipt, AssemblySettings};
pub use engine::{ResultSelector, RunOutput, RunReport, WorkflowEngine};
pub use render::{placeholders, render};
pub use router::{BackendCapability, BackendRouter, CallSite, IdPattern, RoutingRule, RoutingTable};
pub use single::{RunRequest, RunResult, SingleRunner};
