//! Workflow Definitions
//!
//! A workflow is a flat, ordered list of module ids. There is no graph and
//! no cycle concept: step `i + 1` always consumes what step `i` produced.
//!
//! # Example YAML Format
//!
//! ```yaml
//! name: prompt-builder
//! steps:
//!   - input__core_extract__v1
//!   - logic__directive_translate__v1
//!   - structure__separate_instruction_context__v1
//!   - logic__optimize_expression__v1
//!   - example_generator__positive_negative__v1
//! assembly:
//!   content_key: logic__optimize_expression__v1
//!   tags_key: meta__auto_tag__v1
//! ```
//!
//! A bare YAML list of ids is accepted as well.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::execution::assembler::AssemblySettings;

/// What to do when the same module id appears more than once.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Run every occurrence; each one gets its own context entry
    #[default]
    KeepAll,
    /// Refuse to run a workflow that repeats an id
    Reject,
}

/// An ordered sequence of module ids to execute.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct WorkflowDefinition {
    /// Optional label used in logs and artifact metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Module ids in execution order
    pub steps: Vec<String>,

    /// Settings for the terminal assembly step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assembly: Option<AssemblySettings>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Full(WorkflowDefinition),
    Steps(Vec<String>),
}

impl WorkflowDefinition {
    /// Creates a definition from module ids.
    pub fn new<I, S>(steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: None,
            steps: steps.into_iter().map(|s| s.into().trim().to_string()).collect(),
            assembly: None,
        }
    }

    /// Sets the workflow name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets assembly settings.
    pub fn with_assembly(mut self, assembly: AssemblySettings) -> Self {
        self.assembly = Some(assembly);
        self
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the workflow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Label used in logs.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Module ids that occur more than once, in first-repeat order.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates: Vec<&str> = Vec::new();

        for id in &self.steps {
            if !seen.insert(id.as_str()) && !duplicates.contains(&id.as_str()) {
                duplicates.push(id);
            }
        }
        duplicates
    }

    /// Checks the structure of the definition.
    ///
    /// Catalog membership is checked separately by the engine, since the
    /// definition does not know the catalog.
    pub fn validate(&self, policy: DuplicatePolicy) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Validation("workflow has no steps".to_string()));
        }

        if let Some(index) = self.steps.iter().position(|id| id.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "step {} has an empty module id",
                index
            )));
        }

        let duplicates = self.duplicate_ids();
        if !duplicates.is_empty() {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(Error::Validation(format!(
                        "duplicate module ids in workflow: {}",
                        duplicates.join(", ")
                    )));
                }
                DuplicatePolicy::KeepAll => {
                    warn!(
                        "Workflow '{}' repeats module ids: {}",
                        self.label(),
                        duplicates.join(", ")
                    );
                }
            }
        }

        debug!("Workflow '{}' structure valid ({} steps)", self.label(), self.len());
        Ok(())
    }
}

/// Parses a workflow definition from YAML text.
pub fn parse_definition(content: &str) -> Result<WorkflowDefinition> {
    let file: DefinitionFile = serde_yaml::from_str(content).map_err(|e| Error::Parse {
        what: "workflow definition".to_string(),
        reason: e.to_string(),
    })?;

    Ok(match file {
        DefinitionFile::Full(definition) => definition,
        DefinitionFile::Steps(steps) => WorkflowDefinition::new(steps),
    })
}

/// Loads a workflow definition from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use promptflow::workflow::load_definition;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let definition = load_definition("prompt-builder.yaml")?;
///     println!("Loaded {} steps", definition.len());
///     Ok(())
/// }
/// ```
pub fn load_definition(path: impl AsRef<Path>) -> Result<WorkflowDefinition> {
    let path = path.as_ref();
    info!("Loading workflow from: {}", path.display());

    let content = fs::read_to_string(path).map_err(|e| Error::Configuration {
        path: path.display().to_string(),
        reason: format!("failed to read workflow file: {}", e),
    })?;

    let mut definition = parse_definition(&content)?;
    if definition.name.is_none() {
        definition.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_string);
    }

    info!("Parsed {} steps", definition.len());
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_new_trims_ids() {
        let definition = WorkflowDefinition::new([" m1 ", "m2"]);
        assert_eq!(definition.steps, vec!["m1", "m2"]);
        assert_eq!(definition.label(), "workflow");
    }

    #[test]
    fn test_empty_workflow_is_invalid() {
        let definition = WorkflowDefinition::new(Vec::<String>::new());
        let err = definition.validate(DuplicatePolicy::KeepAll).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_blank_id_is_invalid() {
        let definition = WorkflowDefinition::new(["m1", "  "]);
        let err = definition.validate(DuplicatePolicy::KeepAll).unwrap_err();
        assert!(err.to_string().contains("step 1"));
    }

    #[test]
    fn test_duplicates_detected_once() {
        let definition = WorkflowDefinition::new(["a", "b", "a", "a", "b"]);
        assert_eq!(definition.duplicate_ids(), vec!["a", "b"]);
    }

    #[test]
    fn test_duplicate_policy() {
        let definition = WorkflowDefinition::new(["m1", "m2", "m1"]);
        assert!(definition.validate(DuplicatePolicy::KeepAll).is_ok());

        let err = definition.validate(DuplicatePolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("m1"));
    }

    #[test]
    fn test_parse_full_definition() {
        let yaml = r#"
name: builder
steps:
  - input__core_extract__v1
  - export__final__v1
assembly:
  content_key: export__final__v1
"#;
        let definition = parse_definition(yaml).unwrap();
        assert_eq!(definition.name.as_deref(), Some("builder"));
        assert_eq!(definition.len(), 2);
        let assembly = definition.assembly.unwrap();
        assert_eq!(assembly.content_key.as_deref(), Some("export__final__v1"));
    }

    #[test]
    fn test_parse_bare_list() {
        let definition = parse_definition("- m1\n- m2\n- m1\n").unwrap();
        assert_eq!(definition.steps, vec!["m1", "m2", "m1"]);
        assert!(definition.assembly.is_none());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_definition("steps: [[[");
        assert!(matches!(result, Err(Error::Parse { .. })));
    }

    #[test]
    fn test_load_definition_names_from_file_stem() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("prompt-builder.yaml");
        std::fs::write(&path, "steps:\n  - m1\n").unwrap();

        let definition = load_definition(&path).unwrap();
        assert_eq!(definition.name.as_deref(), Some("prompt-builder"));
        assert_eq!(definition.steps, vec!["m1"]);
    }

    #[test]
    fn test_load_definition_missing_file() {
        let result = load_definition("/nonexistent/workflow.yaml");
        assert!(matches!(result, Err(Error::Configuration { .. })));
    }
}
