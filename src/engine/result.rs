// src/engine/result.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::dag::{TaskId, TaskResult, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Every task reached a terminal state on its own.
    Completed,
    /// A failure under stop-on-failure skipped the tasks not yet started.
    Aborted,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowStatus::Completed => f.write_str("completed"),
            WorkflowStatus::Aborted => f.write_str("aborted"),
        }
    }
}

/// Outcome of one orchestrated workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowResult {
    pub status: WorkflowStatus,
    pub tasks: BTreeMap<TaskId, TaskResult>,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_wall_time: Duration,
}

impl WorkflowResult {
    pub fn from_results(
        results: HashMap<TaskId, TaskResult>,
        aborted: bool,
        total_wall_time: Duration,
    ) -> Self {
        let tasks: BTreeMap<TaskId, TaskResult> = results.into_iter().collect();
        let count = |state: TaskState| tasks.values().filter(|r| r.state == state).count();

        Self {
            status: if aborted {
                WorkflowStatus::Aborted
            } else {
                WorkflowStatus::Completed
            },
            succeeded: count(TaskState::Succeeded),
            failed: count(TaskState::Failed),
            skipped: count(TaskState::Skipped),
            tasks,
            total_wall_time,
        }
    }

    /// Completed with no failed task.
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed && self.failed == 0
    }

    pub fn task(&self, id: &str) -> Option<&TaskResult> {
        self.tasks.get(id)
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.tasks.get(id).map(|r| r.state)
    }

    pub fn failed_tasks(&self) -> impl Iterator<Item = &str> {
        self.tasks
            .iter()
            .filter(|(_, r)| r.state == TaskState::Failed)
            .map(|(id, _)| id.as_str())
    }
}
