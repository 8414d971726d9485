// tests/orchestrator.rs

mod common;
use crate::common::{
    FakeExecutor, FakeOutcome, MemorySink, RecordingListener, TaskBuilder, build_graph, diamond,
    independent, init_tracing, with_timeout,
};

use std::sync::Arc;
use std::time::Duration;

use dagvisor::condition::{ConditionContext, ConditionEvaluator, SkipCondition};
use dagvisor::dag::{SkipReason, TaskState};
use dagvisor::engine::{WorkflowOrchestrator, WorkflowStatus};
use dagvisor_test_utils::SinkEntry;

const STEP: Duration = Duration::from_millis(40);

#[tokio::test]
async fn diamond_join_waits_for_both_branches() {
    init_tracing();
    let exec = FakeExecutor::new()
        .script("B", FakeOutcome::Success, STEP)
        .script("C", FakeOutcome::Success, STEP * 3);
    let orchestrator = WorkflowOrchestrator::new(exec);

    let result = with_timeout(orchestrator.run(&diamond(), 4, false)).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.is_success());
    assert_eq!(result.succeeded, 4);

    let exec = orchestrator.executor();
    let d_start = exec.started_at("D").expect("D started");
    for dep in ["B", "C"] {
        let done = exec.finished_at(dep).expect("dependency finished");
        assert!(done <= d_start, "D started before {dep} finished");
    }
    let a_done = exec.finished_at("A").unwrap();
    assert!(a_done <= exec.started_at("B").unwrap());
    assert!(a_done <= exec.started_at("C").unwrap());
    assert_eq!(exec.max_concurrency(), 2, "B and C overlap");
}

#[tokio::test]
async fn failure_skips_dependents_and_independent_work_continues() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("A").build(),
        TaskBuilder::new("B").after("A").build(),
        TaskBuilder::new("C").build(),
    ]);
    let exec = FakeExecutor::new()
        .fail("A", 1)
        .script("C", FakeOutcome::Success, STEP);
    let orchestrator = WorkflowOrchestrator::new(exec);

    let result = with_timeout(orchestrator.run(&graph, 4, false)).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(!result.is_success());
    assert_eq!(result.state_of("A"), Some(TaskState::Failed));
    assert_eq!(result.state_of("B"), Some(TaskState::Skipped));
    assert_eq!(result.state_of("C"), Some(TaskState::Succeeded));
    assert_eq!(
        result.task("B").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::UpstreamFailed {
            dependency: "A".into()
        })
    );
    assert_eq!(result.failed_tasks().collect::<Vec<_>>(), vec!["A"]);
    assert!(!orchestrator.executor().started().contains(&"B".to_string()));
}

#[tokio::test]
async fn stop_on_failure_aborts_but_lets_running_tasks_finish() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("fails").build(),
        TaskBuilder::new("slow").build(),
        TaskBuilder::new("later").after("slow").build(),
        TaskBuilder::new("other").after("fails").build(),
    ]);
    let exec = FakeExecutor::new()
        .script("fails", FakeOutcome::Fail(2), STEP)
        .script("slow", FakeOutcome::Success, STEP * 4);
    let orchestrator = WorkflowOrchestrator::new(exec);

    let result = with_timeout(orchestrator.run(&graph, 2, true)).await;

    assert_eq!(result.status, WorkflowStatus::Aborted);
    assert!(!result.is_success());
    assert_eq!(result.state_of("fails"), Some(TaskState::Failed));
    assert_eq!(result.state_of("slow"), Some(TaskState::Succeeded));
    assert_eq!(result.state_of("later"), Some(TaskState::Skipped));
    assert_eq!(
        result.task("later").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::Aborted)
    );
    assert_eq!(result.state_of("other"), Some(TaskState::Skipped));
    assert_eq!(orchestrator.executor().started().len(), 2);
}

#[tokio::test]
async fn concurrency_never_exceeds_max_parallel() {
    init_tracing();
    for limit in [1usize, 2, 3] {
        let exec = FakeExecutor::new().with_default_delay(Duration::from_millis(15));
        let orchestrator = WorkflowOrchestrator::new(exec);

        let result = with_timeout(orchestrator.run(&independent(8), limit, false)).await;

        assert_eq!(result.succeeded, 8);
        let seen = orchestrator.executor().max_concurrency();
        assert!(seen <= limit, "limit {limit}, saw {seen}");
        assert_eq!(seen, limit, "independent tasks should fill every slot");
    }
}

#[tokio::test]
async fn zero_parallelism_is_treated_as_one() {
    init_tracing();
    let exec = FakeExecutor::new().with_default_delay(Duration::from_millis(5));
    let orchestrator = WorkflowOrchestrator::new(exec);

    let result = with_timeout(orchestrator.run(&independent(3), 0, false)).await;

    assert_eq!(result.succeeded, 3);
    assert_eq!(orchestrator.executor().max_concurrency(), 1);
}

#[tokio::test]
async fn listeners_see_every_transition_in_order() {
    init_tracing();
    let listener = Arc::new(RecordingListener::new());
    let orchestrator = WorkflowOrchestrator::new(FakeExecutor::new().fail("B", 1))
        .with_listener(listener.clone());

    let result = with_timeout(orchestrator.run(&diamond(), 2, false)).await;
    assert_eq!(result.failed, 1);

    use TaskState::*;
    assert_eq!(listener.path_of("A"), vec![Pending, Ready, Running, Succeeded]);
    assert_eq!(listener.path_of("B"), vec![Pending, Ready, Running, Failed]);
    assert_eq!(listener.path_of("D"), vec![Pending, Skipped]);

    assert!(listener.position("A", Succeeded) < listener.position("B", Running));
    assert!(listener.position("B", Failed) < listener.position("D", Skipped));

    let transitions = listener.transitions();
    for pair in transitions.windows(2) {
        assert!(pair[0].elapsed <= pair[1].elapsed, "elapsed is monotonic");
    }
}

#[tokio::test]
async fn sink_gets_one_entry_per_executed_task_and_one_summary() {
    init_tracing();
    let sink = Arc::new(MemorySink::new());
    let graph = build_graph(vec![
        TaskBuilder::new("a").build(),
        TaskBuilder::new("b").after("a").build(),
        TaskBuilder::new("c").after("b").build(),
    ]);
    let orchestrator =
        WorkflowOrchestrator::new(FakeExecutor::new().fail("b", 9)).with_sink(sink.clone());

    let result = with_timeout(orchestrator.run(&graph, 2, false)).await;

    let mut executed = sink.execution_ids();
    executed.sort();
    assert_eq!(executed, vec!["a", "b"], "skipped tasks are not recorded");
    assert_eq!(sink.workflow_count(), 1);

    match sink.entries().last() {
        Some(SinkEntry::Workflow(recorded)) => assert_eq!(recorded, &result),
        other => panic!("expected the workflow summary last, got {other:?}"),
    }
    let b = sink.entries().into_iter().find_map(|e| match e {
        SinkEntry::Execution { task_id, result } if task_id == "b" => Some(result),
        _ => None,
    });
    assert_eq!(b.and_then(|r| r.exit_code()), Some(9));
}

#[tokio::test]
async fn skip_condition_is_evaluated_against_finished_results() {
    init_tracing();
    let listener = Arc::new(RecordingListener::new());
    let graph = build_graph(vec![
        TaskBuilder::new("check").build(),
        TaskBuilder::new("fix")
            .after("check")
            .skip_if("check.status == succeeded")
            .build(),
        TaskBuilder::new("report").after("fix").run_always().build(),
    ]);
    let orchestrator =
        WorkflowOrchestrator::new(FakeExecutor::new()).with_listener(listener.clone());

    let result = with_timeout(orchestrator.run(&graph, 2, false)).await;

    assert!(result.is_success());
    assert_eq!(result.state_of("fix"), Some(TaskState::Skipped));
    assert_eq!(result.state_of("report"), Some(TaskState::Succeeded));
    assert!(!listener.path_of("fix").contains(&TaskState::Running));
    assert!(!orchestrator.executor().started().contains(&"fix".to_string()));
}

/// Skips every task whose condition text mentions "flaky".
struct KeywordEvaluator;

impl ConditionEvaluator for KeywordEvaluator {
    fn evaluate(&self, condition: &SkipCondition, _context: &ConditionContext) -> bool {
        condition.source.contains("flaky")
    }
}

#[tokio::test]
async fn custom_evaluator_replaces_the_default() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("a").skip_if("never").build(),
        TaskBuilder::new("flaky").skip_if("flaky.attempts > 100 or never").build(),
    ]);
    let orchestrator =
        WorkflowOrchestrator::new(FakeExecutor::new()).with_evaluator(KeywordEvaluator);

    let result = with_timeout(orchestrator.run(&graph, 2, false)).await;

    assert_eq!(result.state_of("a"), Some(TaskState::Succeeded));
    assert_eq!(result.state_of("flaky"), Some(TaskState::Skipped));
}

#[tokio::test]
async fn empty_graph_completes_immediately() {
    let sink = Arc::new(MemorySink::new());
    let orchestrator = WorkflowOrchestrator::new(FakeExecutor::new()).with_sink(sink.clone());

    let result = with_timeout(orchestrator.run(&build_graph(Vec::new()), 4, false)).await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.tasks.is_empty());
    assert_eq!(sink.workflow_count(), 1);
}

#[tokio::test]
async fn shared_executor_across_runs() {
    let exec = Arc::new(FakeExecutor::new());
    let first = WorkflowOrchestrator::from_arc(Arc::clone(&exec));
    let second = WorkflowOrchestrator::from_arc(Arc::clone(&exec));

    with_timeout(first.run(&independent(2), 2, false)).await;
    with_timeout(second.run(&independent(3), 2, false)).await;

    assert_eq!(exec.started().len(), 5);
}
