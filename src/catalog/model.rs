//! Prompt Module Data Model
//!
//! Core data structures for the reusable prompt modules a workflow is built
//! from.
//!
//! # Example YAML Format
//!
//! ```yaml
//! core:
//!   - id: input__core_extract__v1
//!     name: Core requirement extraction
//!     prompt_template: |
//!       Extract the core requirements from: {{input}}
//!
//! builder_extensions:
//!   - id: example_generator__positive_negative__v1
//!     name: Positive / negative examples
//!     prompt_template: "Write examples for: {{ input }}"
//!     execution_mode: gemini_generation
//! ```

use serde::{Deserialize, Serialize};

/// Separator between the segments of a module id.
pub const ID_SEPARATOR: &str = "__";

/// How a module asks to be executed when run on its own.
///
/// Unknown tags deserialize to [`ExecutionMode::Passthrough`], which returns
/// the rendered template verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Primary remote generation service
    AiGeneration,
    /// Secondary remote generation service
    GeminiGeneration,
    /// Locally hosted model
    LocalLlm,
    /// No backend call
    #[serde(other)]
    Passthrough,
}

impl ExecutionMode {
    /// Parses a mode tag, mapping anything unrecognized to passthrough.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim() {
            "ai_generation" => Self::AiGeneration,
            "gemini_generation" => Self::GeminiGeneration,
            "local_llm" => Self::LocalLlm,
            _ => Self::Passthrough,
        }
    }

    /// Returns the serialized tag for this mode.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::AiGeneration => "ai_generation",
            Self::GeminiGeneration => "gemini_generation",
            Self::LocalLlm => "local_llm",
            Self::Passthrough => "passthrough",
        }
    }
}

/// A named, reusable unit of prompt work.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Module {
    /// Unique identifier, category-prefixed (e.g. `logic__optimize_expression__v1`)
    pub id: String,

    /// Human-readable label
    #[serde(default)]
    pub name: String,

    /// Template with `{{key}}` placeholders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,

    /// Declared execution mode for standalone runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_mode: Option<ExecutionMode>,

    /// Optional free-form description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Module {
    /// Creates a module with a template and no declared mode.
    ///
    /// # Example
    ///
    /// ```
    /// use promptflow::catalog::Module;
    ///
    /// let module = Module::new("logic__directive_translate__v1", "Directive", "Rewrite: {{input}}");
    /// assert_eq!(module.category(), "logic");
    /// ```
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        prompt_template: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into().trim().to_string(),
            name: name.into(),
            prompt_template: Some(prompt_template.into()),
            execution_mode: None,
            description: None,
        }
    }

    /// Sets the declared execution mode.
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = Some(mode);
        self
    }

    /// Removes the template (catalog entries may omit it).
    pub fn without_template(mut self) -> Self {
        self.prompt_template = None;
        self
    }

    /// Returns the category segment of the id.
    pub fn category(&self) -> &str {
        category_of(&self.id)
    }

    /// Returns the template if it is present and not blank.
    pub fn template(&self) -> Option<&str> {
        self.prompt_template
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }

    /// Label used in logs: the name when set, otherwise the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Returns the category of a module id: the segment before the first `__`,
/// or the whole id when there is no separator.
pub fn category_of(id: &str) -> &str {
    id.split(ID_SEPARATOR).next().unwrap_or(id)
}
