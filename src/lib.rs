//! insightflow - analysis pipeline orchestration core
//!
//! The supervising half of a natural-language BI assistant: validates
//! a proposed analysis plan into a dependency-ordered graph, executes
//! its steps with partial-failure isolation and bounded concurrency,
//! broadcasts progress through a durable ordered event bus, and wraps
//! data queries in a bounded self-healing retry loop.

pub mod bus;
pub mod cli;
pub mod core;
pub mod execution;
pub mod healing;
pub mod oracle;

// Re-export commonly used types
pub use bus::{EventBus, Journal, Message, MessageKind, Metadata, Scope, SubscriptionId};
pub use core::{
    ExecutionContext, InputRef, PipelineGraph, PipelineStatus, PipelineStep, PlanConfig,
    SkipReason, StepFailure, StepInputs, StepStatus, ValidationError,
};
pub use execution::{
    CancellationFlag, ExecutionResult, ExecutorConfig, PipelineExecutor, StepError, StepRunner,
};
pub use healing::{
    Diagnosis, ExhaustionReason, HealingExecutor, HealingSession, HealingStatus, QueryAttempt,
    QueryDiagnoser, QueryError, QueryRunner,
};
pub use oracle::{
    Column, InMemorySchemaCatalog, OracleDiagnoser, OracleError, SchemaCatalog, TextOracle,
};
