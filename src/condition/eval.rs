// src/condition/eval.rs

use std::collections::HashMap;

use crate::condition::expr::{CompareOp, Expr, Field, SkipCondition, Value};
use crate::dag::{TaskId, TaskResult};

/// Results visible to a condition: every task that has a recorded state.
pub type ConditionContext = HashMap<TaskId, TaskResult>;

/// Decides whether a task's `skip_if` holds.
///
/// The orchestrator calls this with the scheduler lock held, so
/// implementations must not block.
pub trait ConditionEvaluator: Send + Sync + 'static {
    fn evaluate(&self, condition: &SkipCondition, context: &ConditionContext) -> bool;
}

/// Walks the parsed [`Expr`] tree.
///
/// A comparison against a task missing from the context, or against a value
/// the task does not have (say `exit_code` of a skipped task), is `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl ConditionEvaluator for ExprEvaluator {
    fn evaluate(&self, condition: &SkipCondition, context: &ConditionContext) -> bool {
        eval_expr(&condition.expr, context)
    }
}

pub fn eval_expr(expr: &Expr, context: &ConditionContext) -> bool {
    match expr {
        Expr::Literal(b) => *b,
        Expr::And(parts) => parts.iter().all(|e| eval_expr(e, context)),
        Expr::Or(parts) => parts.iter().any(|e| eval_expr(e, context)),
        Expr::Not(inner) => !eval_expr(inner, context),
        Expr::Compare {
            task,
            field,
            op,
            value,
        } => {
            let Some(result) = context.get(task) else {
                return false;
            };
            match lookup(result, *field) {
                Some(actual) => compare(&actual, *op, value),
                None => false,
            }
        }
    }
}

fn lookup(result: &TaskResult, field: Field) -> Option<Value> {
    let exec = result.execution.as_ref();
    match field {
        Field::Status => Some(Value::Text(result.state.as_str().to_string())),
        Field::Outcome => Some(Value::Text(
            exec.map_or("none", |e| e.status.as_str()).to_string(),
        )),
        Field::ExitCode => exec
            .and_then(|e| e.exit_code())
            .map(|c| Value::Number(f64::from(c))),
        Field::Attempts => Some(Value::Number(
            exec.map_or(0.0, |e| f64::from(e.attempt_count())),
        )),
        Field::DurationMs => exec.map(|e| Value::Number(e.total_elapsed.as_secs_f64() * 1000.0)),
        Field::PeakMemoryBytes => exec.map(|e| Value::Number(e.peak_memory_bytes() as f64)),
        Field::MaxCpu => exec.map(|e| Value::Number(e.max_cpu_percent())),
        Field::AvgCpu => exec.map(|e| Value::Number(e.avg_cpu_percent())),
    }
}

fn compare(actual: &Value, op: CompareOp, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => match op {
            CompareOp::Eq => a == b,
            CompareOp::NotEq => a != b,
            CompareOp::Gt => a > b,
            CompareOp::Lt => a < b,
            CompareOp::GtEq => a >= b,
            CompareOp::LtEq => a <= b,
        },
        (Value::Text(a), Value::Text(b)) => match op {
            CompareOp::Eq => a.eq_ignore_ascii_case(b),
            CompareOp::NotEq => !a.eq_ignore_ascii_case(b),
            _ => false,
        },
        // Number vs text never matches; `!=` is true since they differ.
        _ => op == CompareOp::NotEq,
    }
}
