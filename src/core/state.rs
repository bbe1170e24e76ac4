//! Execution status models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Runtime status of a single step
///
/// Held in the [`ExecutionContext`](crate::core::ExecutionContext), never
/// on the step itself. Completed, Failed and Skipped are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Waiting for dependencies
    Pending,
    /// All dependencies completed, waiting for a dispatch slot
    Ready,
    /// Currently running
    Running,
    /// Finished successfully
    Completed,
    /// Finished with an error
    Failed,
    /// Never ran and never will in this execution
    Skipped { reason: SkipReason },
}

impl StepStatus {
    /// Check if the status is terminal for this execution
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped { .. }
        )
    }
}

/// Why a step was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// A (transitive) dependency failed
    DependencyFailed { dependency: String },
    /// The run was cancelled before the step could start
    Cancelled,
}

/// Failure detail recorded for a step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepFailure {
    /// The step that failed
    pub step_id: String,

    /// Human-readable failure message
    pub message: String,

    /// When the failure was recorded
    pub failed_at: DateTime<Utc>,
}

impl StepFailure {
    /// Record a failure for a step, timestamped now
    pub fn new(step_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            message: message.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Overall outcome of one pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Every step completed
    Success,
    /// Some steps completed, some failed or were skipped
    Partial,
    /// No step completed (includes the degenerate empty pipeline)
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_status_is_terminal() {
        assert!(!StepStatus::Pending.is_terminal());
        assert!(!StepStatus::Ready.is_terminal());
        assert!(!StepStatus::Running.is_terminal());
        assert!(StepStatus::Completed.is_terminal());
        assert!(StepStatus::Failed.is_terminal());
        assert!(StepStatus::Skipped {
            reason: SkipReason::Cancelled
        }
        .is_terminal());
    }

    #[test]
    fn test_step_failure_carries_step_id() {
        let failure = StepFailure::new("fetch", "relation \"orderz\" does not exist");
        assert_eq!(failure.step_id, "fetch");
        assert!(failure.message.contains("orderz"));
    }
}
