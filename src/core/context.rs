//! Execution context - run-scoped statuses, outputs and errors

use crate::core::state::{StepFailure, StepStatus};
use crate::core::step::PipelineStep;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

/// Errors raised by context mutation
#[derive(Debug, Error)]
pub enum ContextError {
    /// Outputs are write-once per name
    #[error("output \"{name}\" was already published")]
    OutputTaken { name: String },
}

/// Mutable state for one pipeline run
///
/// Owned exclusively by the executor: step bodies never see it, they
/// receive a [`StepInputs`] snapshot of their declared inputs instead.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    statuses: IndexMap<String, StepStatus>,
    outputs: IndexMap<String, Value>,
    errors: IndexMap<String, StepFailure>,
}

impl ExecutionContext {
    /// Create a new empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status of a step
    pub fn status(&self, step_id: &str) -> Option<&StepStatus> {
        self.statuses.get(step_id)
    }

    /// All step statuses in graph order
    pub fn statuses(&self) -> &IndexMap<String, StepStatus> {
        &self.statuses
    }

    /// All published outputs
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    /// All recorded failures, keyed by step id
    pub fn errors(&self) -> &IndexMap<String, StepFailure> {
        &self.errors
    }

    /// Count of steps currently in the given status
    pub fn count_where(&self, predicate: impl Fn(&StepStatus) -> bool) -> usize {
        self.statuses.values().filter(|s| predicate(s)).count()
    }

    pub(crate) fn set_status(&mut self, step_id: &str, status: StepStatus) {
        self.statuses.insert(step_id.to_string(), status);
    }

    /// Publish a step output. Write-once per name.
    pub(crate) fn publish_output(&mut self, name: &str, value: Value) -> Result<(), ContextError> {
        if self.outputs.contains_key(name) {
            return Err(ContextError::OutputTaken {
                name: name.to_string(),
            });
        }
        self.outputs.insert(name.to_string(), value);
        Ok(())
    }

    pub(crate) fn record_failure(&mut self, failure: StepFailure) {
        self.errors.insert(failure.step_id.clone(), failure);
    }

    /// Snapshot the declared inputs of a step for its runner
    pub fn inputs_for(&self, step: &PipelineStep) -> StepInputs {
        let mut values = IndexMap::new();
        for name in step.output_inputs() {
            if let Some(value) = self.outputs.get(name) {
                values.insert(name.to_string(), value.clone());
            }
        }
        StepInputs { values }
    }

    /// Decompose into (statuses, outputs, errors) at the end of a run
    pub(crate) fn into_parts(
        self,
    ) -> (
        IndexMap<String, StepStatus>,
        IndexMap<String, Value>,
        IndexMap<String, StepFailure>,
    ) {
        (self.statuses, self.outputs, self.errors)
    }
}

/// Read-only view of the outputs a step declared as inputs
#[derive(Debug, Clone, Default)]
pub struct StepInputs {
    values: IndexMap<String, Value>,
}

impl StepInputs {
    /// Look up one input by its published name
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Number of resolved inputs
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no declared input resolved to a published output
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (name, value) pairs in publication order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}
