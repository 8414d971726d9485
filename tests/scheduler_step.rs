// tests/scheduler_step.rs

mod common;
use crate::common::{FakeOutcome, TaskBuilder, build_graph, diamond, fake_result, init_tracing};

use std::time::Duration;

use dagvisor::condition::ExprEvaluator;
use dagvisor::dag::{Scheduler, SchedulerStep, SkipReason, TaskState};
use dagvisor::exec::ExecutionResult;

fn ok() -> ExecutionResult {
    fake_result(FakeOutcome::Success, Duration::from_millis(5))
}

fn failed(code: i32) -> ExecutionResult {
    fake_result(FakeOutcome::Fail(code), Duration::from_millis(5))
}

fn claim(s: &mut Scheduler) -> SchedulerStep {
    s.claim_next(&ExprEvaluator)
}

fn claimed_id(step: &SchedulerStep) -> Option<&str> {
    step.dispatched.as_ref().map(|t| t.id.as_str())
}

/// Claim until nothing more is handed out; returns the claimed ids.
fn claim_all(s: &mut Scheduler) -> Vec<String> {
    let mut out = Vec::new();
    loop {
        let step = claim(s);
        match step.dispatched {
            Some(task) => out.push(task.id),
            None => return out,
        }
    }
}

#[test]
fn diamond_runs_level_by_level() {
    init_tracing();
    let graph = diamond();
    let mut s = Scheduler::new(&graph, false);

    let first = claim(&mut s);
    assert_eq!(claimed_id(&first), Some("A"));
    assert_eq!(
        first.moved_to(TaskState::Ready),
        vec!["A"],
        "ready is recorded before running"
    );
    assert_eq!(first.moved_to(TaskState::Running), vec!["A"]);
    assert!(claim(&mut s).dispatched.is_none(), "B and C wait on A");

    s.complete("A", ok());
    let mut middle = claim_all(&mut s);
    middle.sort();
    assert_eq!(middle, vec!["B", "C"]);
    assert_eq!(s.running_count(), 2);

    s.complete("B", ok());
    assert!(claim(&mut s).dispatched.is_none(), "D waits on C");

    s.complete("C", ok());
    assert_eq!(claim_all(&mut s), vec!["D"]);

    let last = s.complete("D", ok());
    assert!(last.run_finished);
    assert!(s.is_finished());
    assert!(!s.is_aborted());
    for id in ["A", "B", "C", "D"] {
        assert_eq!(s.state_of(id), Some(TaskState::Succeeded));
    }
}

#[test]
fn failure_skips_downstream_but_not_siblings() {
    init_tracing();
    // A -> B -> C, and an unrelated D.
    let graph = build_graph(vec![
        TaskBuilder::new("A").build(),
        TaskBuilder::new("B").after("A").build(),
        TaskBuilder::new("C").after("B").build(),
        TaskBuilder::new("D").build(),
    ]);
    let mut s = Scheduler::new(&graph, false);

    let mut first = claim_all(&mut s);
    first.sort();
    assert_eq!(first, vec!["A", "D"]);

    let step = s.complete("A", failed(1));
    assert_eq!(step.moved_to(TaskState::Failed), vec!["A"]);
    let mut skipped = step.moved_to(TaskState::Skipped);
    skipped.sort();
    assert_eq!(skipped, vec!["B", "C"]);
    assert!(!step.run_finished, "D is still running");

    assert_eq!(
        s.result_of("B").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::UpstreamFailed {
            dependency: "A".into()
        })
    );
    assert_eq!(
        s.result_of("C").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::UpstreamSkipped {
            dependency: "B".into()
        })
    );

    let done = s.complete("D", ok());
    assert!(done.run_finished);
    assert_eq!(s.state_of("D"), Some(TaskState::Succeeded));
    assert!(!s.is_aborted());
}

#[test]
fn stop_on_failure_aborts_pending_work() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("A").build(),
        TaskBuilder::new("B").build(),
        TaskBuilder::new("C").after("A").build(),
        TaskBuilder::new("D").after("B").build(),
    ]);
    let mut s = Scheduler::new(&graph, true);

    let mut first = claim_all(&mut s);
    first.sort();
    assert_eq!(first, vec!["A", "B"]);

    s.complete("A", failed(3));
    assert!(s.is_aborted());
    assert_eq!(
        s.result_of("C").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::UpstreamFailed {
            dependency: "A".into()
        })
    );
    assert_eq!(
        s.result_of("D").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::Aborted)
    );

    // B keeps running and its completion is still recorded.
    assert!(claim(&mut s).dispatched.is_none());
    let done = s.complete("B", ok());
    assert!(done.run_finished);
    assert_eq!(s.state_of("B"), Some(TaskState::Succeeded));
    assert!(claim(&mut s).dispatched.is_none(), "nothing is claimed after abort");
}

#[test]
fn run_always_waits_for_terminal_dependencies() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("build").build(),
        TaskBuilder::new("test").after("build").build(),
        TaskBuilder::new("cleanup")
            .after("build")
            .after("test")
            .run_always()
            .build(),
    ]);
    let mut s = Scheduler::new(&graph, false);

    assert_eq!(claim_all(&mut s), vec!["build"]);
    let step = s.complete("build", failed(1));
    assert_eq!(step.moved_to(TaskState::Skipped), vec!["test"]);
    assert_eq!(s.state_of("cleanup"), Some(TaskState::Pending));

    assert_eq!(claim_all(&mut s), vec!["cleanup"]);
    assert!(s.complete("cleanup", ok()).run_finished);
    assert_eq!(s.state_of("cleanup"), Some(TaskState::Succeeded));
}

#[test]
fn run_always_task_still_waits_while_a_dependency_runs() {
    let graph = build_graph(vec![
        TaskBuilder::new("slow").build(),
        TaskBuilder::new("fast").build(),
        TaskBuilder::new("report")
            .after("slow")
            .after("fast")
            .run_always()
            .build(),
    ]);
    let mut s = Scheduler::new(&graph, false);

    let mut first = claim_all(&mut s);
    first.sort();
    assert_eq!(first, vec!["fast", "slow"]);

    s.complete("fast", failed(1));
    assert!(claim(&mut s).dispatched.is_none());
    s.complete("slow", ok());
    assert_eq!(claim_all(&mut s), vec!["report"]);
}

#[test]
fn skip_condition_skips_without_running() {
    init_tracing();
    let graph = build_graph(vec![
        TaskBuilder::new("probe").build(),
        TaskBuilder::new("install")
            .after("probe")
            .skip_if("probe.exit_code == 0")
            .build(),
        TaskBuilder::new("configure").after("install").build(),
    ]);
    let mut s = Scheduler::new(&graph, false);

    assert_eq!(claim_all(&mut s), vec!["probe"]);
    s.complete("probe", ok());

    let step = claim(&mut s);
    assert!(step.dispatched.is_none());
    assert!(step.run_finished);

    let install: Vec<_> = step
        .transitions
        .iter()
        .filter(|c| c.task == "install")
        .map(|c| (c.from, c.to))
        .collect();
    assert_eq!(
        install,
        vec![
            (TaskState::Pending, TaskState::Ready),
            (TaskState::Ready, TaskState::Skipped),
        ],
        "a condition skip never passes through running"
    );
    assert!(matches!(
        s.result_of("install").and_then(|r| r.skip_reason.clone()),
        Some(SkipReason::ConditionMet { .. })
    ));
    assert_eq!(s.state_of("configure"), Some(TaskState::Skipped));
}

#[test]
fn false_skip_condition_runs_the_task() {
    let graph = build_graph(vec![
        TaskBuilder::new("probe").build(),
        TaskBuilder::new("install")
            .after("probe")
            .skip_if("probe.exit_code == 0")
            .build(),
    ]);
    let mut s = Scheduler::new(&graph, false);

    claim_all(&mut s);
    s.complete("probe", failed(1));
    // install is blocked by the failed dependency before its condition is read.
    assert_eq!(s.state_of("install"), Some(TaskState::Skipped));

    let graph = build_graph(vec![
        TaskBuilder::new("probe").build(),
        TaskBuilder::new("install")
            .after("probe")
            .skip_if("probe.duration_ms > 60000")
            .build(),
    ]);
    let mut s = Scheduler::new(&graph, false);
    claim_all(&mut s);
    s.complete("probe", ok());
    assert_eq!(claim_all(&mut s), vec!["install"]);
}

#[test]
fn completion_of_unknown_or_idle_task_is_ignored() {
    let graph = diamond();
    let mut s = Scheduler::new(&graph, false);

    let step = s.complete("A", ok());
    assert!(step.transitions.is_empty());
    assert_eq!(s.state_of("A"), Some(TaskState::Pending));

    let step = s.complete("nope", ok());
    assert!(step.transitions.is_empty());
}

#[test]
fn empty_graph_is_finished_immediately() {
    let graph = build_graph(Vec::new());
    let mut s = Scheduler::new(&graph, false);
    assert!(s.is_finished());
    let step = claim(&mut s);
    assert!(step.dispatched.is_none());
    assert!(step.transitions.is_empty());
}

#[test]
fn results_keep_the_execution_of_each_run_task() {
    let graph = diamond();
    let mut s = Scheduler::new(&graph, false);
    claim_all(&mut s);
    s.complete("A", failed(7));

    let results = s.into_results();
    assert_eq!(results.len(), 4);
    let a = &results["A"];
    assert_eq!(a.state, TaskState::Failed);
    assert_eq!(a.execution.as_ref().and_then(|e| e.exit_code()), Some(7));
    assert!(results["D"].execution.is_none());
}
