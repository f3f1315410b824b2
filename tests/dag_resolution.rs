// tests/dag_resolution.rs

mod common;
use crate::common::Harness;

use std::error::Error;

use batchdag::dag::{DagGraph, PipelineResult, RunState, Task, TaskId};
use batchdag::errors::{BatchdagError, FailureReason};
use batchdag::exec::JobFailure;
use batchdag::params::Parameters;
use batchdag_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

///      A
///     / \
///    C   D
///     \ /
///      E
fn diamond() -> Harness {
    let mut h = Harness::new();
    h.add(h.job("A"));
    h.add(h.job("C").after("A"));
    h.add(h.job("D").after("A"));
    h.add(h.job("E").after("C").after("D"));
    h
}

#[tokio::test]
async fn diamond_runs_shared_prerequisite_once() -> TestResult {
    init_tracing();
    let h = diamond();

    let result = h.scheduler().run("E").await?;
    assert_eq!(result, PipelineResult::AllComplete);
    assert_eq!(h.runner.count("A"), 1);
    assert_eq!(h.runner.invocations(), vec!["A", "C", "D", "E"]);

    Ok(())
}

#[tokio::test]
async fn diamond_runs_shared_prerequisite_once_in_parallel_mode() -> TestResult {
    init_tracing();
    let mut h = diamond();
    h.parallel = true;

    let result = h.scheduler().run("E").await?;
    assert_eq!(result, PipelineResult::AllComplete);
    assert_eq!(h.runner.count("A"), 1);
    assert_eq!(h.runner.invocations().len(), 4);
    assert_eq!(h.runner.invocations().last().map(String::as_str), Some("E"));

    Ok(())
}

#[tokio::test]
async fn cycle_is_rejected_before_any_job() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.add(h.job("A").after("B"));
    h.add(h.job("B").after("A"));
    h.add(h.job("Root").after("A"));

    let err = h
        .scheduler()
        .run("Root")
        .await
        .expect_err("cycle must be rejected");
    assert!(matches!(err, BatchdagError::DagCycle(_)), "got {err:?}");
    assert!(err.is_configuration());
    assert!(h.runner.invocations().is_empty());

    Ok(())
}

#[tokio::test]
async fn self_dependency_is_a_cycle() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.add(h.job("Loop").after("Loop"));

    let err = DagGraph::resolve(&h.registry, "Loop").expect_err("self loop");
    assert!(matches!(err, BatchdagError::DagCycle(_)), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn unknown_prerequisite_is_task_not_found() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.add(h.job("B").after("Ghost"));

    let err = h.scheduler().run("B").await.expect_err("dangling prerequisite");
    assert!(matches!(err, BatchdagError::TaskNotFound(_)), "got {err:?}");
    assert!(h.runner.invocations().is_empty());

    let err = h.scheduler().run("Nope").await.expect_err("unknown root");
    assert!(matches!(err, BatchdagError::TaskNotFound(_)), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn missing_required_parameter_fails_before_execution() -> TestResult {
    init_tracing();
    let runner = batchdag_test_utils::FakeJobRunner::new().with_required(&["OUTPUT_PATH"]);
    let mut h = Harness::with_runner(runner);
    h.add(h.job("A").param("OUTPUT_PATH", "out/a"));
    h.add(h.job("B").after("A"));

    let err = h.scheduler().run("B").await.expect_err("B lacks OUTPUT_PATH");
    match err {
        BatchdagError::MissingParameter { task, parameter } => {
            assert_eq!(task, "B");
            assert_eq!(parameter, "OUTPUT_PATH");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert!(h.runner.invocations().is_empty());

    Ok(())
}

#[tokio::test]
async fn flattened_order_puts_prerequisites_first() -> TestResult {
    let h = diamond();
    let graph = DagGraph::resolve(&h.registry, "E")?;

    assert_eq!(graph.order(), ["A", "C", "D", "E"]);
    assert_eq!(graph.dependencies_of("E"), ["C", "D"]);
    let mut dependents = graph.dependents_of("A").to_vec();
    dependents.sort();
    assert_eq!(dependents, ["C", "D"]);

    // Only the reachable part is resolved.
    let partial = DagGraph::resolve(&h.registry, "C")?;
    assert_eq!(partial.order(), ["A", "C"]);

    Ok(())
}

#[tokio::test]
async fn siblings_run_in_declared_order_and_stop_at_first_failure() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.add(h.job("Z"));
    h.add(h.job("M"));
    h.add(h.job("A"));
    h.add(h.job("Root").after("Z").after("M").after("A"));
    h.runner.fail_task("M", JobFailure::Crashed { exit_code: Some(2) });

    let result = h.scheduler().run("Root").await?;
    match result {
        PipelineResult::Failed { task_id, .. } => assert_eq!(task_id.as_str(), "M"),
        other => panic!("expected failure, got {other:?}"),
    }
    // Sequential mode: A is never started once M fails.
    assert_eq!(h.runner.invocations(), vec!["Z", "M"]);

    Ok(())
}

#[tokio::test]
async fn parallel_mode_reports_first_failure_in_declared_order() -> TestResult {
    init_tracing();
    let runner = batchdag_test_utils::FakeJobRunner::new()
        .with_delay(std::time::Duration::from_millis(20));
    let mut h = Harness::with_runner(runner);
    h.parallel = true;
    h.add(h.job("First"));
    h.add(h.job("Second"));
    h.add(h.job("Root").after("First").after("Second"));
    h.runner.fail_task("First", JobFailure::Crashed { exit_code: Some(1) });
    h.runner.fail_task("Second", JobFailure::Crashed { exit_code: Some(2) });

    let result = h.scheduler().run("Root").await?;
    match result {
        PipelineResult::Failed { task_id, reason } => {
            assert_eq!(task_id.as_str(), "First");
            assert_eq!(
                reason,
                FailureReason::Job(JobFailure::Crashed { exit_code: Some(1) })
            );
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.runner.max_concurrent(), 2);
    assert_eq!(h.runner.count("Root"), 0);

    Ok(())
}

#[tokio::test]
async fn failure_id_is_preserved_through_dependents() -> TestResult {
    init_tracing();
    let mut h = Harness::new();
    h.add(h.job("Leaf"));
    h.add(h.job("Mid").after("Leaf"));
    h.add(Task::barrier("Top").after("Mid"));
    h.runner.fail_task("Leaf", JobFailure::TimedOut(std::time::Duration::from_secs(1)));

    let scheduler = h.scheduler();
    let ctx = scheduler.new_context();
    let result = scheduler.run_in(&ctx, "Top").await?;

    match result {
        PipelineResult::Failed { task_id, .. } => assert_eq!(task_id.as_str(), "Leaf"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(ctx.state_of(&TaskId::derive("Leaf", &Parameters::new())), Some(RunState::Failed));
    assert_eq!(ctx.state_of(&TaskId::derive("Mid", &Parameters::new())), Some(RunState::Failed));
    assert_eq!(ctx.state_of(&TaskId::derive("Top", &Parameters::new())), Some(RunState::Failed));
    assert!(!ctx.has_unfinished_tasks());

    Ok(())
}

#[tokio::test]
async fn duplicate_task_names_are_rejected() -> TestResult {
    let mut h = Harness::new();
    h.add(h.job("A"));
    let err = h.registry.insert(h.job("A")).expect_err("duplicate");
    assert!(matches!(err, BatchdagError::ConfigError(_)));
    Ok(())
}
