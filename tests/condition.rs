// tests/condition.rs

mod common;
use crate::common::{FakeOutcome, fake_result};

use std::time::Duration;

use dagvisor::condition::{
    CompareOp, ConditionContext, ConditionEvaluator, Expr, ExprEvaluator, Field, SkipCondition,
    Value,
};
use dagvisor::dag::{SkipReason, TaskResult, TaskState};
use dagvisor::errors::DagvisorError;

fn finished(outcome: FakeOutcome, ms: u64) -> TaskResult {
    let execution = fake_result(outcome, Duration::from_millis(ms));
    TaskResult {
        state: if execution.is_success() {
            TaskState::Succeeded
        } else {
            TaskState::Failed
        },
        execution: Some(execution),
        skip_reason: None,
    }
}

fn skipped() -> TaskResult {
    TaskResult {
        state: TaskState::Skipped,
        execution: None,
        skip_reason: Some(SkipReason::Aborted),
    }
}

fn holds(expression: &str, context: &ConditionContext) -> bool {
    let condition = SkipCondition::parse(expression).expect("expression parses");
    ExprEvaluator.evaluate(&condition, context)
}

fn context() -> ConditionContext {
    ConditionContext::from([
        ("build".to_string(), finished(FakeOutcome::Success, 1500)),
        ("lint".to_string(), finished(FakeOutcome::Fail(2), 20)),
        ("docs".to_string(), skipped()),
        (
            "test[mode=a,size=1]".to_string(),
            finished(FakeOutcome::TimedOut, 30_000),
        ),
    ])
}

#[test]
fn parses_a_simple_comparison() {
    let expr = Expr::parse("build.exit_code != 0").unwrap();
    assert_eq!(
        expr,
        Expr::Compare {
            task: "build".into(),
            field: Field::ExitCode,
            op: CompareOp::NotEq,
            value: Value::Number(0.0),
        }
    );
}

#[test]
fn and_binds_tighter_than_or() {
    let expr = Expr::parse("a.status == failed or b.status == failed and c.attempts > 1").unwrap();
    match expr {
        Expr::Or(parts) => {
            assert_eq!(parts.len(), 2);
            assert!(matches!(parts[1], Expr::And(ref inner) if inner.len() == 2));
        }
        other => panic!("expected Or at the root, got {other:?}"),
    }
}

#[test]
fn bracketed_task_ids_are_kept_whole() {
    let expr = Expr::parse("test[mode=a,size=1].outcome == 'timed_out'").unwrap();
    assert_eq!(expr.referenced_tasks(), vec!["test[mode=a,size=1]"]);
    assert!(holds("test[mode=a,size=1].outcome == 'timed_out'", &context()));
}

#[test]
fn referenced_tasks_are_deduplicated() {
    let expr = Expr::parse("NOT (b.status == failed OR a.attempts >= 2) AND b.exit_code == 1")
        .unwrap();
    assert_eq!(expr.referenced_tasks(), vec!["a", "b"]);
}

#[test]
fn literals() {
    let empty = ConditionContext::new();
    assert!(holds("always", &empty));
    assert!(holds("TRUE", &empty));
    assert!(!holds("never", &empty));
    assert!(!holds("false", &empty));
    assert!(holds("NOT never", &empty));
    assert_eq!(SkipCondition::parse("always").unwrap().expr, Expr::Literal(true));
}

#[test]
fn status_and_outcome_comparisons() {
    let ctx = context();
    assert!(holds("lint.status == failed", &ctx));
    assert!(holds("lint.status == FAILED", &ctx), "text comparison ignores case");
    assert!(holds("build.status == \"succeeded\"", &ctx));
    assert!(holds("lint.outcome == failed", &ctx));
    assert!(holds("docs.status == skipped", &ctx));
    assert!(holds("docs.outcome == none", &ctx));
    assert!(!holds("build.status != succeeded", &ctx));
}

#[test]
fn numeric_comparisons() {
    let ctx = context();
    assert!(holds("lint.exit_code == 2", &ctx));
    assert!(holds("lint.exit_code >= 2 and lint.exit_code <= 2", &ctx));
    assert!(holds("build.duration_ms > 1000", &ctx));
    assert!(!holds("build.duration_ms < 1000", &ctx));
    assert!(holds("build.attempts == 1", &ctx));
    assert!(holds("docs.attempts == 0", &ctx));
}

#[test]
fn missing_values_compare_false() {
    let ctx = context();
    // Skipped task has no exit code; timed-out task neither.
    assert!(!holds("docs.exit_code == 0", &ctx));
    assert!(!holds("docs.exit_code != 0", &ctx));
    assert!(!holds("test[mode=a,size=1].exit_code != 0", &ctx));
    // Unknown task.
    assert!(!holds("ghost.status == failed", &ctx));
    assert!(holds("NOT ghost.status == failed", &ctx));
}

#[test]
fn mixed_type_comparisons() {
    let ctx = context();
    assert!(!holds("lint.exit_code == failed", &ctx));
    assert!(holds("lint.exit_code != failed", &ctx));
    assert!(!holds("lint.status > 3", &ctx));
    assert!(!holds("lint.status > failed", &ctx), "ordering on text is never true");
}

#[test]
fn parse_errors_are_reported() {
    for bad in [
        "",
        "build.status ==",
        "build.status failed",
        "build == 1",
        "build.colour == red",
        "(build.status == failed",
        "build.status == failed)",
        "build.status = failed",
        "build.status == 'unterminated",
        "test[mode=a.status == failed",
        "AND build.status == failed",
    ] {
        let err = SkipCondition::parse(bad).unwrap_err();
        assert!(
            matches!(err, DagvisorError::InvalidCondition { .. }),
            "'{bad}' gave {err:?}"
        );
    }
}

#[test]
fn display_round_trips_through_the_parser() {
    let source = "NOT (a.status == failed OR b.exit_code > 3) AND c.outcome != 'success'";
    let expr = Expr::parse(source).unwrap();
    let reparsed = Expr::parse(&expr.to_string()).unwrap();
    assert_eq!(expr, reparsed);
}

#[test]
fn evaluator_is_usable_as_trait_object() {
    let evaluator: Box<dyn ConditionEvaluator> = Box::new(ExprEvaluator);
    let condition = SkipCondition::parse("build.status == succeeded").unwrap();
    assert!(evaluator.evaluate(&condition, &context()));
}
