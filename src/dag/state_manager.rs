// src/dag/state_manager.rs

//! Per-run state transitions for tasks in the scheduler.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::dag::scheduler_step::StatusChange;
use crate::dag::task::TaskId;
use crate::dag::task_info::{SkipReason, TaskInfo, TaskResult, TaskState};

/// Whether a pending task may leave `Pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Readiness {
    /// Some dependency has not finished.
    Waiting,
    Ready,
    /// A dependency failed or was skipped and the task does not run
    /// regardless.
    Blocked(SkipReason),
}

/// Applies transitions to the result map and records each one.
pub(crate) struct StateManager<'a> {
    tasks: &'a HashMap<TaskId, TaskInfo>,
    results: &'a mut HashMap<TaskId, TaskResult>,
    transitions: &'a mut Vec<StatusChange>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        tasks: &'a HashMap<TaskId, TaskInfo>,
        results: &'a mut HashMap<TaskId, TaskResult>,
        transitions: &'a mut Vec<StatusChange>,
    ) -> Self {
        Self {
            tasks,
            results,
            transitions,
        }
    }

    pub fn results(&self) -> &HashMap<TaskId, TaskResult> {
        self.results
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.results.get(id).map(|r| r.state)
    }

    pub fn set_state(&mut self, id: &str, to: TaskState) {
        let Some(result) = self.results.get_mut(id) else {
            warn!(task = %id, "state change for unknown task; ignoring");
            return;
        };
        let from = result.state;
        result.state = to;
        debug!(task = %id, %from, %to, "task state");
        self.transitions.push(StatusChange {
            task: id.to_string(),
            from,
            to,
        });
    }

    pub fn skip(&mut self, id: &str, reason: SkipReason) {
        if let Some(result) = self.results.get_mut(id) {
            result.skip_reason = Some(reason);
        }
        self.set_state(id, TaskState::Skipped);
    }

    /// Default rule: every dependency must have succeeded, and any failed or
    /// skipped dependency blocks the task. With `run_always` the task only
    /// waits for every dependency to be terminal.
    pub fn readiness(&self, info: &TaskInfo) -> Readiness {
        let mut waiting = false;
        for dep in &info.deps {
            let Some(state) = self.state_of(dep) else {
                warn!(task = %info.id, dep = %dep, "dependency missing from result map");
                return Readiness::Waiting;
            };
            match state {
                TaskState::Succeeded => {}
                TaskState::Failed if !info.run_always => {
                    return Readiness::Blocked(SkipReason::UpstreamFailed {
                        dependency: dep.clone(),
                    });
                }
                TaskState::Skipped if !info.run_always => {
                    return Readiness::Blocked(SkipReason::UpstreamSkipped {
                        dependency: dep.clone(),
                    });
                }
                TaskState::Failed | TaskState::Skipped => {}
                TaskState::Pending | TaskState::Ready | TaskState::Running => waiting = true,
            }
        }
        if waiting {
            Readiness::Waiting
        } else {
            Readiness::Ready
        }
    }

    /// Skip every pending, non-`run_always` dependent reachable from `root`
    /// through blocked tasks.
    ///
    /// Returns the ids newly skipped.
    pub fn cascade_skip(&mut self, root: &str) -> Vec<TaskId> {
        let tasks = self.tasks;
        let mut stack: Vec<TaskId> = vec![root.to_string()];
        let mut skipped = Vec::new();

        while let Some(current) = stack.pop() {
            let Some(info) = tasks.get(&current) else {
                continue;
            };
            for dependent in &info.dependents {
                if self.state_of(dependent) != Some(TaskState::Pending) {
                    continue;
                }
                let Some(dep_info) = tasks.get(dependent) else {
                    continue;
                };
                if let Readiness::Blocked(reason) = self.readiness(dep_info) {
                    debug!(task = %dependent, %reason, "cascading skip");
                    self.skip(dependent, reason);
                    skipped.push(dependent.clone());
                    stack.push(dependent.clone());
                }
            }
        }

        skipped
    }

    /// Mark every `Pending` task `Skipped`; returns how many.
    pub fn skip_all_pending(&mut self, order: &[TaskId], reason: SkipReason) -> usize {
        let mut count = 0;
        for id in order {
            if self.state_of(id) == Some(TaskState::Pending) {
                self.skip(id, reason.clone());
                count += 1;
            }
        }
        count
    }

    pub fn all_terminal(&self) -> bool {
        self.results.values().all(|r| r.state.is_terminal())
    }
}
