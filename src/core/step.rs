//! Step domain model

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single unit of work in an analysis pipeline
///
/// Steps are created once at pipeline-build time and are immutable
/// thereafter; only their runtime status (held in the
/// [`ExecutionContext`](crate::core::ExecutionContext)) changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStep {
    /// Unique step identifier within a pipeline
    pub id: String,

    /// Opaque action tag (e.g. "profile", "query", "transform")
    pub action: String,

    /// Human-readable description of what the step does
    #[serde(default)]
    pub description: String,

    /// Named references to prior outputs or external resources
    #[serde(default)]
    pub inputs: Vec<InputRef>,

    /// Name under which this step's result is published into the
    /// shared execution context, if any
    #[serde(default)]
    pub output: Option<String>,

    /// Estimated duration in seconds (planner hint, not enforced)
    #[serde(default)]
    pub estimated_secs: Option<u64>,

    /// Step ids that must complete before this step can run
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A named reference consumed by a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputRef {
    /// Output published by a prior step
    Output(String),

    /// External table in the connected data source
    Table(String),

    /// External column in the connected data source
    Column { table: String, column: String },
}

impl InputRef {
    /// Whether this reference points at an external resource
    /// (validated against a schema catalog when one is supplied)
    pub fn is_external(&self) -> bool {
        matches!(self, InputRef::Table(_) | InputRef::Column { .. })
    }

    /// Display name of the referenced resource
    pub fn name(&self) -> String {
        match self {
            InputRef::Output(name) => name.clone(),
            InputRef::Table(name) => name.clone(),
            InputRef::Column { table, column } => format!("{}.{}", table, column),
        }
    }
}

impl PipelineStep {
    /// Create a step with just an id and action; remaining fields default
    pub fn new(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            description: String::new(),
            inputs: Vec::new(),
            output: None,
            estimated_secs: None,
            dependencies: Vec::new(),
        }
    }

    /// Builder-style dependency list
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Builder-style output name
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    /// Builder-style input list
    pub fn with_inputs(mut self, inputs: Vec<InputRef>) -> Self {
        self.inputs = inputs;
        self
    }

    /// Estimated duration as a [`Duration`], if the planner provided one
    pub fn estimated_duration(&self) -> Option<Duration> {
        self.estimated_secs.map(Duration::from_secs)
    }

    /// Names of prior outputs this step consumes
    pub fn output_inputs(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|input| match input {
            InputRef::Output(name) => Some(name.as_str()),
            _ => None,
        })
    }
}
