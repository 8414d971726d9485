// src/dag/task_info.rs

//! Per-task scheduling metadata and per-run results.

use std::fmt;

use serde::Serialize;

use crate::condition::SkipCondition;
use crate::dag::task::{Task, TaskId};
use crate::exec::{ExecutionRequest, ExecutionResult};

/// Scheduler-visible state of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting on dependencies.
    Pending,
    /// Dependencies satisfied; about to be dispatched or skipped.
    Ready,
    /// Handed to the executor.
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Ready => "ready",
            TaskState::Running => "running",
            TaskState::Succeeded => "succeeded",
            TaskState::Failed => "failed",
            TaskState::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a task ended up `Skipped`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    /// A dependency failed.
    UpstreamFailed { dependency: TaskId },
    /// A dependency was itself skipped.
    UpstreamSkipped { dependency: TaskId },
    /// The task's `skip_if` evaluated to true.
    ConditionMet { condition: String },
    /// The workflow stopped on failure before this task started.
    Aborted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::UpstreamFailed { dependency } => {
                write!(f, "dependency '{dependency}' failed")
            }
            SkipReason::UpstreamSkipped { dependency } => {
                write!(f, "dependency '{dependency}' was skipped")
            }
            SkipReason::ConditionMet { condition } => write!(f, "skip_if met: {condition}"),
            SkipReason::Aborted => f.write_str("workflow aborted"),
        }
    }
}

/// Per-task outcome: final state plus the execution history if it ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskResult {
    pub state: TaskState,
    pub execution: Option<ExecutionResult>,
    pub skip_reason: Option<SkipReason>,
}

impl TaskResult {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            execution: None,
            skip_reason: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == TaskState::Succeeded
    }
}

/// Static scheduling view of a task (cloned out of the graph).
#[derive(Debug, Clone)]
pub(crate) struct TaskInfo {
    pub id: TaskId,
    pub request: ExecutionRequest,
    pub deps: Vec<TaskId>,
    pub dependents: Vec<TaskId>,
    pub skip_if: Option<SkipCondition>,
    pub run_always: bool,
}

impl TaskInfo {
    pub fn from_task(task: &Task, dependents: Vec<TaskId>) -> Self {
        Self {
            id: task.id.clone(),
            request: task.request.clone(),
            deps: task.depends_on.clone(),
            dependents,
            skip_if: task.skip_if.clone(),
            run_always: task.run_always,
        }
    }
}

/// A task the scheduler wants the executor to run now.
#[derive(Debug, Clone)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub request: ExecutionRequest,
}

impl ScheduledTask {
    pub(crate) fn from_task_info(info: &TaskInfo) -> Self {
        Self {
            id: info.id.clone(),
            request: info.request.clone(),
        }
    }
}
