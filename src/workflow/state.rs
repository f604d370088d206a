//! Workflow Run State
//!
//! The engine moves through `Pending → RunningStep(i) → Completed` or ends
//! in `Failed`. Every transition is logged. State lives only for the
//! duration of a run; nothing is persisted.

use std::fmt;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::execution::router::BackendCapability;
use crate::workflow::context::ContextValue;

/// Current state of a workflow run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// No step has started yet
    Pending,
    /// Step `index` is executing
    RunningStep { index: usize },
    /// All steps finished
    Completed,
    /// A step failed and the run was aborted
    Failed {
        step_index: Option<usize>,
        module_id: Option<String>,
    },
}

impl RunState {
    /// Returns true once the run can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::RunningStep { index } => write!(f, "running step {}", index),
            Self::Completed => write!(f, "completed"),
            Self::Failed {
                step_index: Some(index),
                module_id: Some(id),
            } => write!(f, "failed at step {} ({})", index, id),
            Self::Failed { .. } => write!(f, "failed"),
        }
    }
}

/// Result of one executed step.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub module_id: String,
    pub step_index: usize,
    pub capability: BackendCapability,
    pub output: ContextValue,
}

/// Drives and logs state transitions for one run.
#[derive(Debug, Clone)]
pub struct RunTracker {
    workflow: String,
    total_steps: usize,
    state: RunState,
}

impl RunTracker {
    /// Creates a tracker in the `Pending` state.
    pub fn new(workflow: impl Into<String>, total_steps: usize) -> Self {
        Self {
            workflow: workflow.into(),
            total_steps,
            state: RunState::Pending,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Marks step `index` as running.
    pub fn start_step(&mut self, index: usize, module_id: &str) {
        info!(
            "[{}] Step {}/{}: {}",
            self.workflow,
            index + 1,
            self.total_steps,
            module_id
        );
        self.transition(RunState::RunningStep { index });
    }

    /// Marks the run as completed.
    pub fn complete(&mut self) {
        info!("[{}] Completed {} steps", self.workflow, self.total_steps);
        self.transition(RunState::Completed);
    }

    /// Marks the run as failed.
    ///
    /// The failing step defaults to the one currently running.
    pub fn fail(&mut self, module_id: Option<&str>, reason: &str) {
        let step_index = match self.state {
            RunState::RunningStep { index } => Some(index),
            _ => None,
        };

        error!(
            "[{}] Run failed at step {}: {}",
            self.workflow,
            step_index.map_or_else(|| "-".to_string(), |i| i.to_string()),
            reason
        );
        self.transition(RunState::Failed {
            step_index,
            module_id: module_id.map(str::to_string),
        });
    }

    fn transition(&mut self, next: RunState) {
        debug!("[{}] State: {} -> {}", self.workflow, self.state, next);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_pending() {
        let tracker = RunTracker::new("wf", 2);
        assert_eq!(tracker.state(), &RunState::Pending);
        assert!(!tracker.state().is_terminal());
    }

    #[test]
    fn test_successful_run() {
        let mut tracker = RunTracker::new("wf", 2);
        tracker.start_step(0, "m1");
        assert_eq!(tracker.state(), &RunState::RunningStep { index: 0 });
        tracker.start_step(1, "m2");
        tracker.complete();
        assert_eq!(tracker.state(), &RunState::Completed);
        assert!(tracker.state().is_terminal());
    }

    #[test]
    fn test_failure_records_running_step() {
        let mut tracker = RunTracker::new("wf", 3);
        tracker.start_step(0, "m1");
        tracker.start_step(1, "m2");
        tracker.fail(Some("m2"), "backend down");

        assert_eq!(
            tracker.state(),
            &RunState::Failed {
                step_index: Some(1),
                module_id: Some("m2".to_string()),
            }
        );
        assert_eq!(tracker.state().to_string(), "failed at step 1 (m2)");
    }

    #[test]
    fn test_failure_before_any_step() {
        let mut tracker = RunTracker::new("wf", 0);
        tracker.fail(None, "workflow has no steps");
        assert_eq!(
            tracker.state(),
            &RunState::Failed {
                step_index: None,
                module_id: None,
            }
        );
        assert_eq!(tracker.state().to_string(), "failed");
    }

    #[test]
    fn test_step_record_serializes() {
        let record = StepRecord {
            module_id: "m1".to_string(),
            step_index: 0,
            capability: BackendCapability::LocalGeneration,
            output: ContextValue::Text("out".to_string()),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["capability"], "local_generation");
        assert_eq!(json["output"]["type"], "text");
    }
}
