//! Backend Routing
//!
//! Decides which generation backend a module runs on. Two call sites feed
//! it different information:
//!
//! - standalone runs of a single stored prompt know the prompt's declared
//!   [`ExecutionMode`] and map it directly;
//! - workflow steps route by module id through an ordered
//!   [`RoutingTable`], ignoring any declared mode.
//!
//! Routing is pure. It never performs I/O.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::model::{category_of, ExecutionMode};

/// The closed set of backends a module can run on.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BackendCapability {
    /// Primary remote generation service
    RemoteGenerationPrimary,
    /// Secondary remote generation service, used for creative tasks
    RemoteGenerationSecondary,
    /// Locally hosted model
    LocalGeneration,
    /// Return the rendered template verbatim
    Passthrough,
}

impl fmt::Display for BackendCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::RemoteGenerationPrimary => "remote-primary",
            Self::RemoteGenerationSecondary => "remote-secondary",
            Self::LocalGeneration => "local",
            Self::Passthrough => "passthrough",
        };
        write!(f, "{}", label)
    }
}

/// Where a routing decision is being made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallSite {
    /// A single stored prompt run outside any workflow
    Standalone,
    /// A step inside a workflow
    Workflow,
}

/// Matches module ids.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdPattern {
    /// Id equals the value
    Exact(String),
    /// Id starts with the value
    Prefix(String),
    /// Id's category segment equals the value
    Category(String),
}

impl IdPattern {
    pub fn matches(&self, module_id: &str) -> bool {
        match self {
            Self::Exact(id) => module_id == id,
            Self::Prefix(prefix) => module_id.starts_with(prefix.as_str()),
            Self::Category(category) => category_of(module_id) == category,
        }
    }
}

/// One entry of a routing table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    #[serde(rename = "match", with = "serde_yaml::with::singleton_map")]
    pub pattern: IdPattern,
    pub capability: BackendCapability,
}

impl RoutingRule {
    pub fn new(pattern: IdPattern, capability: BackendCapability) -> Self {
        Self {
            pattern,
            capability,
        }
    }
}

/// Ordered id-pattern rules; the first match wins.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RoutingTable {
    #[serde(default)]
    pub rules: Vec<RoutingRule>,

    /// Capability used when no rule matches
    #[serde(default = "default_fallback")]
    pub fallback: BackendCapability,
}

fn default_fallback() -> BackendCapability {
    BackendCapability::LocalGeneration
}

impl RoutingTable {
    /// Creates a table with no rules and the local fallback.
    pub fn empty() -> Self {
        Self {
            rules: Vec::new(),
            fallback: default_fallback(),
        }
    }

    /// Appends a rule.
    pub fn with_rule(mut self, pattern: IdPattern, capability: BackendCapability) -> Self {
        self.rules.push(RoutingRule::new(pattern, capability));
        self
    }

    /// Returns the capability for a module id.
    pub fn route(&self, module_id: &str) -> BackendCapability {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(module_id))
            .map(|rule| rule.capability)
            .unwrap_or(self.fallback)
    }
}

impl Default for RoutingTable {
    /// Creative and checking tasks go to the secondary remote service;
    /// structural tasks stay local.
    fn default() -> Self {
        Self::empty()
            .with_rule(
                IdPattern::Category("example_generator".to_string()),
                BackendCapability::RemoteGenerationSecondary,
            )
            .with_rule(
                IdPattern::Category("validation".to_string()),
                BackendCapability::RemoteGenerationSecondary,
            )
            .with_rule(
                IdPattern::Prefix("meta__auto_tag".to_string()),
                BackendCapability::RemoteGenerationSecondary,
            )
    }
}

/// Maps a declared execution mode to a capability.
pub fn select_standalone(mode: Option<&ExecutionMode>) -> BackendCapability {
    match mode {
        Some(ExecutionMode::AiGeneration) => BackendCapability::RemoteGenerationPrimary,
        Some(ExecutionMode::GeminiGeneration) => BackendCapability::RemoteGenerationSecondary,
        Some(ExecutionMode::LocalLlm) => BackendCapability::LocalGeneration,
        Some(ExecutionMode::Passthrough) | None => BackendCapability::Passthrough,
    }
}

/// Routing policy combining both call sites.
#[derive(Debug, Clone, Default)]
pub struct BackendRouter {
    table: RoutingTable,
}

impl BackendRouter {
    pub fn new(table: RoutingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    /// Routes a workflow step by module id.
    pub fn select_in_workflow(&self, module_id: &str) -> BackendCapability {
        self.table.route(module_id)
    }

    /// Routes a module for a given call site.
    ///
    /// Standalone runs use the declared mode (passthrough when none is
    /// declared). Workflow steps use the id table.
    pub fn select(
        &self,
        module_id: &str,
        declared_mode: Option<&ExecutionMode>,
        call_site: CallSite,
    ) -> BackendCapability {
        match call_site {
            CallSite::Standalone => select_standalone(declared_mode),
            CallSite::Workflow => self.select_in_workflow(module_id),
        }
    }
}
