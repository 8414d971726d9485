// src/dag/scheduler_step.rs

//! Step-by-step result types for the scheduler.

use crate::dag::task::TaskId;
use crate::dag::task_info::{ScheduledTask, TaskState};

/// One state transition of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub task: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

/// Structured result of a single scheduler call.
///
/// The orchestrator publishes `transitions` to listeners while it still
/// holds the scheduler lock; tests step the scheduler by hand and assert on
/// them.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Task handed out for execution by this step, if any.
    pub dispatched: Option<ScheduledTask>,
    /// Every transition this step made, in order.
    pub transitions: Vec<StatusChange>,
    /// Whether this step brought every task to a terminal state.
    pub run_finished: bool,
}

impl SchedulerStep {
    /// Ids that moved to `state` during this step.
    pub fn moved_to(&self, state: TaskState) -> Vec<&str> {
        self.transitions
            .iter()
            .filter(|c| c.to == state)
            .map(|c| c.task.as_str())
            .collect()
    }
}
