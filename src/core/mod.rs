//! Core domain models: steps, graphs, execution context

pub mod context;
pub mod graph;
pub mod plan;
pub mod state;
pub mod step;

pub use context::{ContextError, ExecutionContext, StepInputs};
pub use graph::{PipelineGraph, ValidationError};
pub use plan::{PlanConfig, PlanStep};
pub use state::{PipelineStatus, SkipReason, StepFailure, StepStatus};
pub use step::{InputRef, PipelineStep};
