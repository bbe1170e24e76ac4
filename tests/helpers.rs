//! Test utilities shared by the integration scenarios
#![allow(dead_code)]

use async_trait::async_trait;
use insightflow::{
    CancellationFlag, EventBus, ExecutionContext, ExecutionResult, ExecutorConfig, Message,
    MessageKind, PipelineExecutor, PipelineGraph, PipelineStep, StepError, StepInputs, StepRunner,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Mock runner with per-step scripted outcomes
///
/// Records the order steps started in; optionally delays, fails named
/// steps, cancels a flag when a given step runs, and tracks the peak
/// number of concurrently running steps.
#[derive(Default)]
pub struct MockRunner {
    failures: HashMap<String, String>,
    delay_ms: Option<u64>,
    cancel_during: Option<(String, CancellationFlag)>,
    pub started: Arc<Mutex<Vec<String>>>,
    current: Arc<Mutex<usize>>,
    pub peak: Arc<Mutex<usize>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the named step fail with the given message
    pub fn fail(mut self, step_id: &str, message: &str) -> Self {
        self.failures.insert(step_id.to_string(), message.to_string());
        self
    }

    /// Sleep this long inside every step body
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Cancel the flag while the named step is running
    pub fn cancel_during(mut self, step_id: &str, flag: CancellationFlag) -> Self {
        self.cancel_during = Some((step_id.to_string(), flag));
        self
    }

    /// Order in which steps started
    pub fn started_order(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepRunner for MockRunner {
    async fn run(&self, step: &PipelineStep, _inputs: &StepInputs) -> Result<Value, StepError> {
        self.started.lock().unwrap().push(step.id.clone());
        {
            let mut current = self.current.lock().unwrap();
            *current += 1;
            let mut peak = self.peak.lock().unwrap();
            *peak = (*peak).max(*current);
        }

        if let Some((id, flag)) = &self.cancel_during {
            if *id == step.id {
                flag.cancel();
            }
        }

        if let Some(delay_ms) = self.delay_ms {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }

        *self.current.lock().unwrap() -= 1;

        match self.failures.get(&step.id) {
            Some(message) => Err(StepError::Failed(message.clone())),
            None => Ok(json!({ "step": step.id })),
        }
    }
}

/// Subscribe a collector to the bus and return its message log
pub fn capture_messages(bus: &EventBus) -> Arc<Mutex<Vec<Message>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(move |message: &Message| {
        sink.lock().unwrap().push(message.clone());
    });
    seen
}

/// Build a step with an output named `<id>_out`
pub fn step(id: &str, deps: &[&str]) -> PipelineStep {
    PipelineStep::new(id, "query")
        .with_dependencies(deps.iter().map(|d| d.to_string()).collect())
        .with_output(format!("{}_out", id))
}

/// Run a graph against an isolated bus, collecting every message
pub async fn run_graph(
    graph: &PipelineGraph,
    runner: MockRunner,
    max_parallelism: usize,
) -> (ExecutionResult, Vec<Message>) {
    run_graph_with_cancel(graph, runner, max_parallelism, CancellationFlag::new()).await
}

/// Same as [`run_graph`] but with a caller-held cancellation flag
pub async fn run_graph_with_cancel(
    graph: &PipelineGraph,
    runner: MockRunner,
    max_parallelism: usize,
    cancel: CancellationFlag,
) -> (ExecutionResult, Vec<Message>) {
    let bus = Arc::new(EventBus::new());
    let captured = capture_messages(&bus);
    bus.start();

    let executor = PipelineExecutor::with_config(
        bus.clone(),
        ExecutorConfig {
            max_parallelism,
            ..Default::default()
        },
    );
    let result = executor
        .execute(graph, ExecutionContext::new(), Arc::new(runner), &cancel)
        .await;

    bus.stop().await;
    let messages = captured.lock().unwrap().clone();
    (result, messages)
}

/// Index of the first message matching kind + step id
pub fn message_index(
    messages: &[Message],
    kind: MessageKind,
    step_id: &str,
    content_contains: &str,
) -> Option<usize> {
    messages.iter().position(|m| {
        m.kind == kind
            && m.metadata.step_id.as_deref() == Some(step_id)
            && m.content.contains(content_contains)
    })
}
