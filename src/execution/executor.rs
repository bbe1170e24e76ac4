//! Pipeline executor - topological scheduler with bounded concurrency
//!
//! Walks a validated graph, dispatches ready steps (up to a
//! configurable parallelism), and publishes every lifecycle transition
//! to the event bus. A failing step takes down only its own branch:
//! its transitive dependents are skipped in one pass and unrelated
//! branches keep running.

use crate::bus::{EventBus, Message, MessageKind, Metadata, Scope};
use crate::core::{
    ExecutionContext, PipelineGraph, PipelineStatus, PipelineStep, SkipReason, StepFailure,
    StepInputs, StepStatus,
};
use crate::healing::QueryError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Error returned by a step body
#[derive(Debug, Error)]
pub enum StepError {
    /// A data query failed (possibly after exhausting healing)
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Anything else the step body wants to report
    #[error("{0}")]
    Failed(String),
}

/// The sole seam through which "what a step actually does" is injected
///
/// The executor does not know what a step does; SQL execution,
/// transformation and chart selection all live behind this trait.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Run one step with a snapshot of its declared inputs
    async fn run(&self, step: &PipelineStep, inputs: &StepInputs) -> Result<Value, StepError>;
}

/// Cooperative cancellation flag
///
/// Checked between step dispatches; steps already running are allowed
/// to finish (step bodies are opaque, there is no hard interruption).
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of steps running concurrently (clamped to >= 1)
    pub max_parallelism: usize,

    /// Logical component name stamped on published messages
    pub source: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 2,
            source: "pipeline-executor".to_string(),
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Unique id of this run
    pub run_id: Uuid,

    /// Overall outcome
    pub status: PipelineStatus,

    /// Terminal status of every step, in graph order
    pub statuses: indexmap::IndexMap<String, StepStatus>,

    /// Outputs published during the run
    pub outputs: indexmap::IndexMap<String, Value>,

    /// Failure detail for every failed step
    pub failures: Vec<StepFailure>,
}

impl ExecutionResult {
    /// Whether every step completed
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Success
    }
}

/// Walks a [`PipelineGraph`] and supervises its steps
pub struct PipelineExecutor {
    bus: Arc<EventBus>,
    config: ExecutorConfig,
}

impl PipelineExecutor {
    /// Create an executor with the default configuration
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            config: ExecutorConfig::default(),
        }
    }

    /// Create an executor with an explicit configuration
    pub fn with_config(bus: Arc<EventBus>, config: ExecutorConfig) -> Self {
        Self { bus, config }
    }

    /// Execute the graph to completion (or cancellation)
    ///
    /// The context is owned exclusively by this run; step bodies only
    /// ever see [`StepInputs`] snapshots. Returns once every step is
    /// terminal or, after cancellation, once running steps finish.
    pub async fn execute(
        &self,
        graph: &PipelineGraph,
        mut context: ExecutionContext,
        runner: Arc<dyn StepRunner>,
        cancel: &CancellationFlag,
    ) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let total = graph.len();
        let max_parallelism = self.config.max_parallelism.max(1);

        for id in graph.step_ids() {
            context.set_status(id, StepStatus::Pending);
        }

        // degenerate run: the ready-set is empty before anything runs
        if graph.is_empty() {
            warn!("pipeline run {} has no steps", run_id);
            self.notify(
                MessageKind::Error,
                Scope::Pipeline(run_id),
                "pipeline has no steps",
                Metadata::for_run(run_id),
            );
            return finish(run_id, PipelineStatus::Failed, context);
        }

        info!("starting pipeline run {} ({} steps)", run_id, total);
        self.notify(
            MessageKind::Progress,
            Scope::Pipeline(run_id),
            format!("pipeline started ({} steps)", total),
            Metadata::for_run(run_id).with_progress(0, total),
        );

        let mut running: JoinSet<Result<Value, StepError>> = JoinSet::new();
        let mut inflight: HashMap<tokio::task::Id, String> = HashMap::new();
        let mut completed = 0usize;

        loop {
            if !cancel.is_cancelled() {
                promote_ready(graph, &mut context);

                let dispatchable: Vec<String> = graph
                    .step_ids()
                    .filter(|id| matches!(context.status(id), Some(StepStatus::Ready)))
                    .take(max_parallelism.saturating_sub(running.len()))
                    .map(String::from)
                    .collect();

                for step_id in dispatchable {
                    // a validated graph always resolves its own ids
                    let Some(step) = graph.step(&step_id).cloned() else {
                        continue;
                    };
                    context.set_status(&step_id, StepStatus::Running);
                    debug!("dispatching step {}", step_id);
                    self.notify(
                        MessageKind::Progress,
                        Scope::Step(step_id.clone()),
                        format!("step {} running", step_id),
                        Metadata::for_run(run_id)
                            .with_step(&step_id)
                            .with_progress(completed, total),
                    );

                    let inputs = context.inputs_for(&step);
                    let runner = Arc::clone(&runner);
                    let handle = running.spawn(async move { runner.run(&step, &inputs).await });
                    inflight.insert(handle.id(), step_id);
                }
            }

            if running.is_empty() {
                break;
            }

            let Some(joined) = running.join_next_with_id().await else {
                break;
            };

            match joined {
                Ok((task_id, result)) => {
                    let Some(step_id) = inflight.remove(&task_id) else {
                        continue;
                    };
                    match result {
                        Ok(value) => {
                            match self.complete_step(graph, &mut context, &step_id, value) {
                                Ok(()) => {
                                    completed += 1;
                                    self.notify(
                                        MessageKind::Complete,
                                        Scope::Step(step_id.clone()),
                                        format!("step {} completed", step_id),
                                        Metadata::for_run(run_id)
                                            .with_step(&step_id)
                                            .with_progress(completed, total),
                                    );
                                }
                                Err(message) => {
                                    self.fail_step(
                                        graph,
                                        &mut context,
                                        &step_id,
                                        message,
                                        run_id,
                                        completed,
                                        total,
                                    );
                                }
                            }
                        }
                        Err(step_error) => {
                            self.fail_step(
                                graph,
                                &mut context,
                                &step_id,
                                step_error.to_string(),
                                run_id,
                                completed,
                                total,
                            );
                        }
                    }
                }
                Err(join_error) => {
                    // runner bodies are opaque; a panic inside one is a
                    // plain step failure for its branch
                    if let Some(step_id) = inflight.remove(&join_error.id()) {
                        self.fail_step(
                            graph,
                            &mut context,
                            &step_id,
                            format!("step body panicked: {}", join_error),
                            run_id,
                            completed,
                            total,
                        );
                    }
                }
            }
        }

        if cancel.is_cancelled() {
            self.skip_remaining_cancelled(graph, &mut context, run_id);
        }

        let status = overall_status(&context, total);
        match status {
            PipelineStatus::Success => {
                info!("pipeline run {} completed", run_id);
                self.notify(
                    MessageKind::Complete,
                    Scope::Pipeline(run_id),
                    "pipeline completed",
                    Metadata::for_run(run_id).with_progress(completed, total),
                );
            }
            PipelineStatus::Partial => {
                let failed = context.errors().len();
                warn!(
                    "pipeline run {} finished partially ({} failed)",
                    run_id, failed
                );
                self.notify(
                    MessageKind::Complete,
                    Scope::Pipeline(run_id),
                    format!("pipeline finished with {} failed step(s)", failed),
                    Metadata::for_run(run_id).with_progress(completed, total),
                );
            }
            PipelineStatus::Failed => {
                error!("pipeline run {} failed: no step completed", run_id);
                self.notify(
                    MessageKind::Error,
                    Scope::Pipeline(run_id),
                    "pipeline failed: no step completed",
                    Metadata::for_run(run_id).with_progress(completed, total),
                );
            }
        }

        finish(run_id, status, context)
    }

    /// Write the step's output (write-once) and mark it completed
    fn complete_step(
        &self,
        graph: &PipelineGraph,
        context: &mut ExecutionContext,
        step_id: &str,
        value: Value,
    ) -> Result<(), String> {
        if let Some(output) = graph.step(step_id).and_then(|s| s.output.clone()) {
            if let Err(e) = context.publish_output(&output, value) {
                return Err(e.to_string());
            }
        }
        context.set_status(step_id, StepStatus::Completed);
        Ok(())
    }

    /// Mark a step failed and skip its transitive dependents in one pass
    fn fail_step(
        &self,
        graph: &PipelineGraph,
        context: &mut ExecutionContext,
        step_id: &str,
        message: String,
        run_id: Uuid,
        completed: usize,
        total: usize,
    ) {
        warn!("step {} failed: {}", step_id, message);
        context.set_status(step_id, StepStatus::Failed);
        context.record_failure(StepFailure::new(step_id, message.clone()));
        self.notify(
            MessageKind::Error,
            Scope::Step(step_id.to_string()),
            format!("step {} failed", step_id),
            Metadata::for_run(run_id)
                .with_step(step_id)
                .with_progress(completed, total)
                .with_detail(message),
        );

        let mut queue: VecDeque<String> =
            graph.dependents_of(step_id).iter().cloned().collect();
        while let Some(dependent) = queue.pop_front() {
            let skippable = matches!(
                context.status(&dependent),
                Some(StepStatus::Pending | StepStatus::Ready)
            );
            if !skippable {
                continue;
            }
            context.set_status(
                &dependent,
                StepStatus::Skipped {
                    reason: SkipReason::DependencyFailed {
                        dependency: step_id.to_string(),
                    },
                },
            );
            self.notify(
                MessageKind::Progress,
                Scope::Step(dependent.clone()),
                format!("step {} skipped", dependent),
                Metadata::for_run(run_id)
                    .with_step(&dependent)
                    .with_detail(format!("dependency {} failed", step_id)),
            );
            queue.extend(graph.dependents_of(&dependent).iter().cloned());
        }
    }

    /// After cancellation, everything that never started is skipped
    fn skip_remaining_cancelled(
        &self,
        graph: &PipelineGraph,
        context: &mut ExecutionContext,
        run_id: Uuid,
    ) {
        let remaining: Vec<String> = graph
            .step_ids()
            .filter(|id| {
                matches!(
                    context.status(id),
                    Some(StepStatus::Pending | StepStatus::Ready)
                )
            })
            .map(String::from)
            .collect();

        for step_id in remaining {
            context.set_status(
                &step_id,
                StepStatus::Skipped {
                    reason: SkipReason::Cancelled,
                },
            );
            self.notify(
                MessageKind::Progress,
                Scope::Step(step_id.clone()),
                format!("step {} skipped", step_id),
                Metadata::for_run(run_id)
                    .with_step(&step_id)
                    .with_detail("run cancelled"),
            );
        }
    }

    fn notify(
        &self,
        kind: MessageKind,
        scope: Scope,
        content: impl Into<String>,
        metadata: Metadata,
    ) {
        let message =
            Message::new(&self.config.source, scope, kind, content).with_metadata(metadata);
        if self.bus.publish(message).is_err() {
            debug!("bus closed; dropping executor notification");
        }
    }
}

/// Promote Pending steps whose dependencies all completed
fn promote_ready(graph: &PipelineGraph, context: &mut ExecutionContext) {
    let ready: Vec<String> = graph
        .steps()
        .filter(|step| {
            matches!(context.status(&step.id), Some(StepStatus::Pending))
                && step
                    .dependencies
                    .iter()
                    .all(|dep| matches!(context.status(dep), Some(StepStatus::Completed)))
        })
        .map(|step| step.id.clone())
        .collect();

    for id in ready {
        context.set_status(&id, StepStatus::Ready);
    }
}

fn overall_status(context: &ExecutionContext, total: usize) -> PipelineStatus {
    let completed = context.count_where(|s| *s == StepStatus::Completed);
    if total > 0 && completed == total {
        PipelineStatus::Success
    } else if completed == 0 {
        PipelineStatus::Failed
    } else {
        PipelineStatus::Partial
    }
}

fn finish(run_id: Uuid, status: PipelineStatus, context: ExecutionContext) -> ExecutionResult {
    let (statuses, outputs, errors) = context.into_parts();
    ExecutionResult {
        run_id,
        status,
        statuses,
        outputs,
        failures: errors.into_values().collect(),
    }
}
