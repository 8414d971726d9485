// src/dag/scheduler.rs

use std::collections::HashMap;

use tracing::{error, info, warn};

use crate::condition::ConditionEvaluator;
use crate::dag::graph::TaskGraph;
use crate::dag::scheduler_step::{SchedulerStep, StatusChange};
use crate::dag::state_manager::{Readiness, StateManager};
use crate::dag::task::TaskId;
use crate::dag::task_info::{ScheduledTask, SkipReason, TaskInfo, TaskResult, TaskState};
use crate::exec::ExecutionResult;

/// Per-workflow state machine over a [`TaskGraph`].
///
/// It is pure: no I/O, no clocks, no executor. The orchestrator owns one
/// behind a single mutex and calls:
/// - [`claim_next`](Self::claim_next) to take the next runnable task
///   (evaluating skip conditions on the way), and
/// - [`complete`](Self::complete) to report its result, which cascades
///   skips to dependents or aborts the run under stop-on-failure.
///
/// Tests drive it by hand the same way.
#[derive(Debug)]
pub struct Scheduler {
    /// Topological order; the scan order for ready tasks.
    order: Vec<TaskId>,
    tasks: HashMap<TaskId, TaskInfo>,
    results: HashMap<TaskId, TaskResult>,
    stop_on_failure: bool,
    aborted: bool,
    running: usize,
    finished: bool,
}

impl Scheduler {
    pub fn new(graph: &TaskGraph, stop_on_failure: bool) -> Self {
        let order: Vec<TaskId> = graph
            .topological_order()
            .into_iter()
            .map(str::to_string)
            .collect();

        let tasks: HashMap<TaskId, TaskInfo> = graph
            .tasks()
            .iter()
            .map(|task| {
                let dependents = graph.dependents_of(&task.id).to_vec();
                (task.id.clone(), TaskInfo::from_task(task, dependents))
            })
            .collect();

        let results = tasks
            .keys()
            .map(|id| (id.clone(), TaskResult::pending()))
            .collect();

        Self {
            order,
            tasks,
            results,
            stop_on_failure,
            aborted: false,
            running: 0,
            finished: graph.is_empty(),
        }
    }

    /// Every task is terminal.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// A failure under stop-on-failure has skipped the rest of the run.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn running_count(&self) -> usize {
        self.running
    }

    pub fn state_of(&self, id: &str) -> Option<TaskState> {
        self.results.get(id).map(|r| r.state)
    }

    pub fn result_of(&self, id: &str) -> Option<&TaskResult> {
        self.results.get(id)
    }

    pub fn results(&self) -> &HashMap<TaskId, TaskResult> {
        &self.results
    }

    pub fn into_results(self) -> HashMap<TaskId, TaskResult> {
        self.results
    }

    /// Hand out the next task whose dependencies allow it to run.
    ///
    /// Ready tasks whose `skip_if` holds are skipped here, and the skip
    /// cascades, before the scan continues. Returns a step with no
    /// `dispatched` task when nothing is runnable right now.
    pub fn claim_next(&mut self, evaluator: &dyn ConditionEvaluator) -> SchedulerStep {
        let mut transitions: Vec<StatusChange> = Vec::new();
        let mut dispatched = None;

        if !self.aborted {
            dispatched = self.claim_internal(evaluator, &mut transitions);
        }

        if dispatched.is_none() && self.running == 0 {
            self.skip_stalled(&mut transitions);
        }

        let run_finished = self.maybe_finish_run(&transitions);
        SchedulerStep {
            dispatched,
            transitions,
            run_finished,
        }
    }

    /// Record the result of a task previously handed out by
    /// [`claim_next`](Self::claim_next).
    pub fn complete(&mut self, id: &str, execution: ExecutionResult) -> SchedulerStep {
        let mut transitions: Vec<StatusChange> = Vec::new();

        if self.state_of(id) != Some(TaskState::Running) {
            warn!(
                task = %id,
                state = ?self.state_of(id),
                "completion for a task that is not running; ignoring"
            );
            return SchedulerStep::default();
        }
        self.running = self.running.saturating_sub(1);

        let succeeded = execution.is_success();
        let status = execution.status;
        if let Some(result) = self.results.get_mut(id) {
            result.execution = Some(execution);
        }

        let mut manager = StateManager::new(&self.tasks, &mut self.results, &mut transitions);
        if succeeded {
            manager.set_state(id, TaskState::Succeeded);
            info!(task = %id, "task succeeded");
        } else {
            manager.set_state(id, TaskState::Failed);
            warn!(task = %id, %status, "task failed");
            let skipped = manager.cascade_skip(id);
            if !skipped.is_empty() {
                info!(task = %id, skipped = skipped.len(), "skipped dependents of failed task");
            }

            if self.stop_on_failure && !self.aborted {
                let count = manager.skip_all_pending(&self.order, SkipReason::Aborted);
                self.aborted = true;
                warn!(
                    task = %id,
                    skipped = count,
                    still_running = self.running,
                    "stop_on_failure: aborting workflow; running tasks will finish"
                );
            }
        }

        let run_finished = self.maybe_finish_run(&transitions);
        SchedulerStep {
            dispatched: None,
            transitions,
            run_finished,
        }
    }

    fn claim_internal(
        &mut self,
        evaluator: &dyn ConditionEvaluator,
        transitions: &mut Vec<StatusChange>,
    ) -> Option<ScheduledTask> {
        let tasks = &self.tasks;
        let mut manager = StateManager::new(tasks, &mut self.results, transitions);

        'scan: loop {
            for id in &self.order {
                if manager.state_of(id) != Some(TaskState::Pending) {
                    continue;
                }
                let Some(info) = tasks.get(id) else { continue };

                match manager.readiness(info) {
                    Readiness::Waiting => continue,
                    Readiness::Blocked(reason) => {
                        manager.skip(id, reason);
                        manager.cascade_skip(id);
                        continue 'scan;
                    }
                    Readiness::Ready => {}
                }

                manager.set_state(id, TaskState::Ready);

                if let Some(cond) = &info.skip_if {
                    if evaluator.evaluate(cond, manager.results()) {
                        info!(task = %id, condition = %cond.source, "skip_if met; skipping task");
                        manager.skip(
                            id,
                            SkipReason::ConditionMet {
                                condition: cond.source.clone(),
                            },
                        );
                        manager.cascade_skip(id);
                        continue 'scan;
                    }
                }

                manager.set_state(id, TaskState::Running);
                self.running += 1;
                info!(task = %id, running = self.running, "dispatching task");
                return Some(ScheduledTask::from_task_info(info));
            }
            return None;
        }
    }

    /// Nothing runs and nothing is runnable, yet tasks are pending. Cannot
    /// happen on a validated graph; skip them rather than hang.
    fn skip_stalled(&mut self, transitions: &mut Vec<StatusChange>) {
        let mut manager = StateManager::new(&self.tasks, &mut self.results, transitions);
        if manager.all_terminal() {
            return;
        }
        if !self.aborted {
            error!("scheduler stalled with pending tasks; skipping them");
        }
        manager.skip_all_pending(&self.order, SkipReason::Aborted);
    }

    /// Returns `true` if this call moved the run to finished.
    fn maybe_finish_run(&mut self, transitions: &[StatusChange]) -> bool {
        if self.finished || transitions.is_empty() {
            return false;
        }
        if self.results.values().all(|r| r.state.is_terminal()) {
            self.finished = true;
            info!(aborted = self.aborted, "scheduler: all tasks terminal");
            true
        } else {
            false
        }
    }
}
