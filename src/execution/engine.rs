//! Workflow Execution Engine
//!
//! Runs a workflow definition step by step:
//! - resolves each module from the catalog
//! - renders its template against the rolling input and the context
//! - routes it to a backend and awaits the result
//! - records the output in the run's context
//!
//! Steps never overlap. The first fatal error aborts the run and no partial
//! result is returned. After the last step the caller chooses what comes
//! back through a [`ResultSelector`], including assembling a new artifact.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::assembler::{ArtifactAssembler, ArtifactReceipt};
use super::render::render;
use super::router::{BackendCapability, BackendRouter};
use crate::backend::BackendSet;
use crate::catalog::{category_of, ModuleCatalog};
use crate::error::{Error, Result};
use crate::monitoring::{EventType, RunTimeline};
use crate::workflow::context::{ContextValue, WorkflowContext};
use crate::workflow::definition::{DuplicatePolicy, WorkflowDefinition};
use crate::workflow::state::{RunState, RunTracker, StepRecord};

/// Module categories whose steps receive the whole context as input.
pub const CONTEXT_CONSUMING_CATEGORIES: &[&str] = &["export", "validation", "meta"];

/// Placeholder bound to the step input when rendering.
pub const INPUT_PLACEHOLDER: &str = "input";

/// What a finished run returns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultSelector {
    /// Every step's output, in order
    StepLog,
    /// The whole context
    Context,
    /// A single context entry (latest value for the key)
    Entry(String),
    /// Build and store a new artifact
    Assemble,
}

impl ResultSelector {
    /// Parses `log`, `context`, `assemble` or `entry:KEY`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "log" | "steps" => Some(Self::StepLog),
            "context" => Some(Self::Context),
            "assemble" => Some(Self::Assemble),
            other => other
                .strip_prefix("entry:")
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .map(|key| Self::Entry(key.to_string())),
        }
    }
}

/// Result of a successful run, shaped by the [`ResultSelector`].
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum RunOutput {
    StepLog(Vec<StepRecord>),
    Context(WorkflowContext),
    Entry(ContextValue),
    Artifact(ArtifactReceipt),
}

/// Outcome of a run together with how it ended.
#[derive(Debug)]
pub struct RunReport {
    /// Always terminal: `Completed` or `Failed`
    pub state: RunState,
    pub timeline: RunTimeline,
    pub outcome: Result<RunOutput>,
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    limit: Duration,
}

impl Deadline {
    fn new(at: Instant, limit: Duration) -> Self {
        Self { at, limit }
    }
}

/// Awaits `work`, failing with [`Error::Timeout`] once the deadline passes.
async fn within<T>(
    deadline: Option<Deadline>,
    workflow: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let Some(deadline) = deadline else {
        return work.await;
    };

    match tokio::time::timeout_at(deadline.at, work).await {
        Ok(result) => result,
        Err(_) => {
            error!("Workflow '{}' exceeded {:?}", workflow, deadline.limit);
            Err(Error::Timeout(deadline.limit))
        }
    }
}

/// Sequential workflow engine.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use promptflow::backend::BackendSet;
/// use promptflow::catalog::{ModuleCatalog, YamlFileSource};
/// use promptflow::execution::{ResultSelector, WorkflowEngine};
/// use promptflow::workflow::WorkflowDefinition;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let catalog = Arc::new(ModuleCatalog::new(YamlFileSource::new("prompt-modules.yaml")));
///     catalog.load_all();
///
///     let engine = WorkflowEngine::new(catalog, BackendSet::new());
///     let definition = WorkflowDefinition::new(["input__core_extract__v1"]);
///
///     let output = engine
///         .run(&definition, "Write a haiku", ResultSelector::StepLog)
///         .await?;
///     println!("{:?}", output);
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    catalog: Arc<ModuleCatalog>,
    backends: BackendSet,
    router: BackendRouter,
    assembler: Option<ArtifactAssembler>,
    duplicate_policy: DuplicatePolicy,
    preflight: bool,
    run_timeout: Option<Duration>,
}

impl WorkflowEngine {
    /// Creates an engine with the default routing table and no assembler.
    pub fn new(catalog: Arc<ModuleCatalog>, backends: BackendSet) -> Self {
        Self {
            catalog,
            backends,
            router: BackendRouter::default(),
            assembler: None,
            duplicate_policy: DuplicatePolicy::default(),
            preflight: false,
            run_timeout: None,
        }
    }

    pub fn with_router(mut self, router: BackendRouter) -> Self {
        self.router = router;
        self
    }

    /// Enables [`ResultSelector::Assemble`].
    pub fn with_assembler(mut self, assembler: ArtifactAssembler) -> Self {
        self.assembler = Some(assembler);
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    /// Checks every module before the first backend call.
    pub fn with_preflight(mut self, enabled: bool) -> Self {
        self.preflight = enabled;
        self
    }

    /// Bounds the duration of a whole run.
    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    /// Checks a definition against the catalog without running anything.
    ///
    /// Every id must resolve to a module with a non-blank template.
    pub fn validate(&self, definition: &WorkflowDefinition) -> Result<()> {
        definition.validate(self.duplicate_policy)?;

        for id in &definition.steps {
            let module = self
                .catalog
                .find_by_id(id)
                .ok_or_else(|| Error::Lookup(id.clone()))?;
            if module.template().is_none() {
                return Err(Error::MissingTemplate(id.clone()));
            }
        }

        debug!("Workflow '{}' passed pre-flight checks", definition.label());
        Ok(())
    }

    /// Executes a workflow and returns the selected result.
    pub async fn run(
        &self,
        definition: &WorkflowDefinition,
        initial_input: impl Into<ContextValue>,
        selector: ResultSelector,
    ) -> Result<RunOutput> {
        self.run_reported(definition, initial_input, selector)
            .await
            .outcome
    }

    /// Executes a workflow and also returns its final state and timeline.
    ///
    /// The run timeout is a deadline shared by every step and by assembly;
    /// the step in flight when it passes is recorded as failed.
    pub async fn run_reported(
        &self,
        definition: &WorkflowDefinition,
        initial_input: impl Into<ContextValue>,
        selector: ResultSelector,
    ) -> RunReport {
        let deadline = self
            .run_timeout
            .map(|limit| Deadline::new(Instant::now() + limit, limit));
        let mut tracker = RunTracker::new(definition.label(), definition.len());
        let mut timeline = RunTimeline::new();

        let outcome = self
            .execute(
                definition,
                initial_input.into(),
                selector,
                deadline,
                &mut tracker,
                &mut timeline,
            )
            .await;

        if let Err(e) = &outcome {
            if !tracker.state().is_terminal() {
                tracker.fail(e.module_id(), &e.to_string());
            }
        }
        debug!("{}", timeline.summary());

        RunReport {
            state: tracker.state().clone(),
            timeline,
            outcome,
        }
    }

    async fn execute(
        &self,
        definition: &WorkflowDefinition,
        initial_input: ContextValue,
        selector: ResultSelector,
        deadline: Option<Deadline>,
        tracker: &mut RunTracker,
        timeline: &mut RunTimeline,
    ) -> Result<RunOutput> {
        let label = definition.label();

        if self.preflight {
            self.validate(definition)?;
        } else {
            definition.validate(self.duplicate_policy)?;
        }

        if selector == ResultSelector::Assemble && self.assembler.is_none() {
            return Err(Error::Validation(
                "assembly requested but no assembler is configured".to_string(),
            ));
        }

        info!("Starting workflow '{}' ({} steps)", label, definition.len());

        let mut context = WorkflowContext::new(initial_input);
        let mut rolling_input = context.initial_input().as_text();
        let mut step_log = Vec::with_capacity(definition.len());

        for (index, module_id) in definition.steps.iter().enumerate() {
            tracker.start_step(index, module_id);
            timeline.add_event(index, module_id, EventType::Started);

            let step = self.execute_step(module_id, &rolling_input, &context);
            let (capability, output) = match within(deadline, label, step).await {
                Ok(result) => result,
                Err(e) => {
                    timeline.add_event(index, module_id, EventType::Failed);
                    tracker.fail(Some(module_id), &e.to_string());
                    return Err(e);
                }
            };

            let value = ContextValue::from_output(output.clone());
            context.record(module_id, index, value.clone());
            rolling_input = output;

            step_log.push(StepRecord {
                module_id: module_id.clone(),
                step_index: index,
                capability,
                output: value,
            });
            timeline.add_event(index, module_id, EventType::Completed);
        }

        let shaped = self.shape_output(definition, context, step_log, selector);
        let output = within(deadline, label, shaped).await?;
        tracker.complete();
        Ok(output)
    }

    /// Runs one step and returns the backend used and its output.
    async fn execute_step(
        &self,
        module_id: &str,
        rolling_input: &str,
        context: &WorkflowContext,
    ) -> Result<(BackendCapability, String)> {
        let module = self
            .catalog
            .find_by_id(module_id)
            .ok_or_else(|| Error::Lookup(module_id.to_string()))?;

        let template = module
            .template()
            .ok_or_else(|| Error::MissingTemplate(module_id.to_string()))?;

        let step_input = if CONTEXT_CONSUMING_CATEGORIES.contains(&category_of(module_id)) {
            context.serialize_for_prompt()
        } else {
            rolling_input.to_string()
        };

        let mut values = context.text_values();
        values.insert(INPUT_PLACEHOLDER.to_string(), step_input);
        let rendered = render(template, &values);

        let capability = self.router.select_in_workflow(module_id);
        debug!("{} -> {} ({} chars)", module_id, capability, rendered.len());

        let output = self
            .backends
            .invoke(capability, &rendered)
            .await
            .map_err(|source| Error::Backend {
                module_id: module_id.to_string(),
                capability,
                source,
            })?;

        Ok((capability, output))
    }

    async fn shape_output(
        &self,
        definition: &WorkflowDefinition,
        context: WorkflowContext,
        step_log: Vec<StepRecord>,
        selector: ResultSelector,
    ) -> Result<RunOutput> {
        match selector {
            ResultSelector::StepLog => Ok(RunOutput::StepLog(step_log)),
            ResultSelector::Context => Ok(RunOutput::Context(context)),
            ResultSelector::Entry(key) => context
                .get(&key)
                .cloned()
                .map(RunOutput::Entry)
                .ok_or_else(|| {
                    Error::Validation(format!("no context entry named '{}'", key))
                }),
            ResultSelector::Assemble => {
                let assembler = self.assembler.as_ref().ok_or_else(|| {
                    Error::Validation("assembly requested but no assembler is configured".to_string())
                })?;
                let settings = definition.assembly.clone().unwrap_or_default();

                assembler
                    .assemble(&context, &settings, definition.label())
                    .await
                    .map(RunOutput::Artifact)
                    .map_err(|e| {
                        error!("Assembly for '{}' failed: {}", definition.label(), e);
                        e
                    })
            }
        }
    }
}
