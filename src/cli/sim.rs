//! Simulated step runner
//!
//! Lets a plan be exercised end-to-end without a connected data
//! source: each step sleeps a fraction of its estimated duration and
//! emits a canned JSON output. Steps named in the failure list raise
//! instead, which is how the demo shows branch isolation.

use crate::core::{PipelineStep, StepInputs};
use crate::execution::{StepError, StepRunner};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

/// Milliseconds simulated per estimated second
const MILLIS_PER_ESTIMATED_SEC: u64 = 10;

/// Stand-in for the surrounding system's real step bodies
#[derive(Debug, Clone, Default)]
pub struct SimulatedRunner {
    fail_steps: HashSet<String>,
}

impl SimulatedRunner {
    /// Create a runner where every step succeeds
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style list of steps that should fail
    pub fn with_failures(mut self, fail_steps: impl IntoIterator<Item = String>) -> Self {
        self.fail_steps = fail_steps.into_iter().collect();
        self
    }
}

#[async_trait]
impl StepRunner for SimulatedRunner {
    async fn run(&self, step: &PipelineStep, inputs: &StepInputs) -> Result<Value, StepError> {
        let millis = step.estimated_secs.unwrap_or(1) * MILLIS_PER_ESTIMATED_SEC;
        tokio::time::sleep(Duration::from_millis(millis)).await;

        if self.fail_steps.contains(&step.id) {
            return Err(StepError::Failed(format!(
                "simulated failure in step {}",
                step.id
            )));
        }

        Ok(json!({
            "step": step.id,
            "action": step.action,
            "consumed_inputs": inputs.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            "simulated": true,
        }))
    }
}
