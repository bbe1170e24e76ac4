//! End-to-end pipeline execution scenarios

mod helpers;

use helpers::*;
use insightflow::{
    MessageKind, PipelineGraph, PipelineStatus, SkipReason, StepStatus, ValidationError,
};

/// A fan-out graph where everything succeeds completes every step
/// exactly once and publishes all declared outputs
#[tokio::test]
async fn test_fan_out_success() {
    let graph = PipelineGraph::build(
        vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])],
        None,
    )
    .unwrap();

    let runner = MockRunner::new();
    let started = runner.started.clone();
    let (result, _messages) = run_graph(&graph, runner, 2).await;

    assert_eq!(result.status, PipelineStatus::Success);
    for id in ["a", "b", "c"] {
        assert_eq!(result.statuses[id], StepStatus::Completed);
        assert!(result.outputs.contains_key(&format!("{}_out", id)));
    }
    assert!(result.failures.is_empty());

    // every step ran exactly once
    let mut order = started.lock().unwrap().clone();
    order.sort();
    assert_eq!(order, vec!["a", "b", "c"]);
}

/// Dependents only start after the dependency's COMPLETE message is
/// published
#[tokio::test]
async fn test_dependents_start_after_dependency_complete_message() {
    let graph = PipelineGraph::build(
        vec![step("a", &[]), step("b", &["a"]), step("c", &["a"])],
        None,
    )
    .unwrap();

    let (result, messages) = run_graph(&graph, MockRunner::new(), 2).await;
    assert_eq!(result.status, PipelineStatus::Success);

    let a_complete = message_index(&messages, MessageKind::Complete, "a", "completed").unwrap();
    let b_running = message_index(&messages, MessageKind::Progress, "b", "running").unwrap();
    let c_running = message_index(&messages, MessageKind::Progress, "c", "running").unwrap();

    assert!(a_complete < b_running, "b started before a completed");
    assert!(a_complete < c_running, "c started before a completed");
}

/// A failing step takes down its transitive dependents and nothing else
#[tokio::test]
async fn test_branch_isolation() {
    let graph = PipelineGraph::build(
        vec![
            step("root", &[]),
            step("broken", &["root"]),
            step("downstream", &["broken"]),
            step("sibling", &["root"]),
        ],
        None,
    )
    .unwrap();

    let runner = MockRunner::new().fail("broken", "column does not exist");
    let started = runner.started.clone();
    let (result, _messages) = run_graph(&graph, runner, 1).await;

    assert_eq!(result.status, PipelineStatus::Partial);
    assert_eq!(result.statuses["root"], StepStatus::Completed);
    assert_eq!(result.statuses["broken"], StepStatus::Failed);
    assert_eq!(
        result.statuses["downstream"],
        StepStatus::Skipped {
            reason: SkipReason::DependencyFailed {
                dependency: "broken".to_string()
            }
        }
    );
    // the unrelated branch still completed
    assert_eq!(result.statuses["sibling"], StepStatus::Completed);
    assert!(result.outputs.contains_key("sibling_out"));

    // the skipped step never ran
    assert!(!started.lock().unwrap().contains(&"downstream".to_string()));

    // failure detail survives with the step id attached
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].step_id, "broken");
    assert!(result.failures[0].message.contains("column does not exist"));
}

/// When the only root fails, nothing completes and the run is FAILED
#[tokio::test]
async fn test_root_failure_reports_failed() {
    let graph = PipelineGraph::build(vec![step("a", &[]), step("b", &["a"])], None).unwrap();

    let runner = MockRunner::new().fail("a", "boom");
    let (result, messages) = run_graph(&graph, runner, 1).await;

    assert_eq!(result.status, PipelineStatus::Failed);
    assert_eq!(result.statuses["a"], StepStatus::Failed);
    assert!(matches!(result.statuses["b"], StepStatus::Skipped { .. }));
    assert_eq!(result.failures[0].step_id, "a");

    // the step error message carries the detail
    let error_index = message_index(&messages, MessageKind::Error, "a", "failed").unwrap();
    assert_eq!(messages[error_index].metadata.detail.as_deref(), Some("boom"));
}

/// Cancellation lets running steps finish and skips the rest with a
/// distinct reason
#[tokio::test]
async fn test_cancellation_skips_remaining_steps() {
    let graph = PipelineGraph::build(
        vec![step("a", &[]), step("b", &["a"]), step("c", &["b"])],
        None,
    )
    .unwrap();

    let cancel = CancellationFlag::new();
    let runner = MockRunner::new().cancel_during("a", cancel.clone());
    let (result, _messages) = run_graph_with_cancel(&graph, runner, 1, cancel).await;

    // a was already running and finished; b and c never started
    assert_eq!(result.statuses["a"], StepStatus::Completed);
    assert_eq!(
        result.statuses["b"],
        StepStatus::Skipped {
            reason: SkipReason::Cancelled
        }
    );
    assert_eq!(
        result.statuses["c"],
        StepStatus::Skipped {
            reason: SkipReason::Cancelled
        }
    );
    assert_eq!(result.status, PipelineStatus::Partial);
}

/// The concurrency cap bounds how many steps run at once
#[tokio::test]
async fn test_parallelism_is_bounded() {
    let graph = PipelineGraph::build(
        vec![step("w", &[]), step("x", &[]), step("y", &[]), step("z", &[])],
        None,
    )
    .unwrap();

    let runner = MockRunner::new().with_delay_ms(30);
    let peak = runner.peak.clone();
    let (result, _messages) = run_graph(&graph, runner, 2).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert!(
        *peak.lock().unwrap() <= 2,
        "more than 2 steps ran concurrently"
    );
}

/// With parallelism 1, dispatch order follows graph order - no hidden
/// randomness in ready-set selection
#[tokio::test]
async fn test_sequential_dispatch_is_deterministic() {
    let graph = PipelineGraph::build(
        vec![step("x", &[]), step("y", &[]), step("z", &[])],
        None,
    )
    .unwrap();

    let runner = MockRunner::new();
    let started = runner.started.clone();
    let (result, _messages) = run_graph(&graph, runner, 1).await;

    assert_eq!(result.status, PipelineStatus::Success);
    assert_eq!(*started.lock().unwrap(), vec!["x", "y", "z"]);
}

/// Progress metadata counts completed steps against the total
#[tokio::test]
async fn test_progress_counts_in_messages() {
    let graph = PipelineGraph::build(vec![step("a", &[]), step("b", &["a"])], None).unwrap();

    let (_result, messages) = run_graph(&graph, MockRunner::new(), 1).await;

    let b_complete = message_index(&messages, MessageKind::Complete, "b", "completed").unwrap();
    assert_eq!(messages[b_complete].metadata.completed, Some(2));
    assert_eq!(messages[b_complete].metadata.total, Some(2));
}

/// A cyclic plan is rejected before anything runs
#[tokio::test]
async fn test_cycle_rejected_before_execution() {
    let result = PipelineGraph::build(vec![step("a", &["b"]), step("b", &["a"])], None);
    assert!(matches!(
        result,
        Err(ValidationError::CyclicDependency { .. })
    ));
}

use insightflow::CancellationFlag;
