//! Pipeline execution: scheduler, runner seam, cancellation

pub mod executor;

pub use executor::{
    CancellationFlag, ExecutionResult, ExecutorConfig, PipelineExecutor, StepError, StepRunner,
};
