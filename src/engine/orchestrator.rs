// src/engine/orchestrator.rs

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::condition::{ConditionEvaluator, ExprEvaluator};
use crate::dag::{Scheduler, SchedulerStep, TaskGraph};
use crate::exec::ExecutorBackend;

use super::{ProgressListener, Record, ResultSink, WorkflowResult};

/// Runs a [`TaskGraph`] on a bounded pool of workers.
///
/// Each worker loops: claim the next runnable task under the scheduler
/// lock, execute it with the lock released, then report the result under
/// the lock again. Workers with nothing to claim park on a [`Notify`]
/// until some other worker changes the scheduler state.
pub struct WorkflowOrchestrator<E: ExecutorBackend> {
    executor: Arc<E>,
    evaluator: Arc<dyn ConditionEvaluator>,
    listeners: Vec<Arc<dyn ProgressListener>>,
    sink: Option<Arc<dyn ResultSink>>,
}

impl<E: ExecutorBackend> fmt::Debug for WorkflowOrchestrator<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowOrchestrator")
            .field("listeners", &self.listeners.len())
            .field("has_sink", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

/// State shared by every worker of one `run`.
struct Shared {
    scheduler: Mutex<Scheduler>,
    wake: Notify,
    started: Instant,
    evaluator: Arc<dyn ConditionEvaluator>,
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl Shared {
    fn publish(&self, step: &SchedulerStep) {
        if step.transitions.is_empty() {
            return;
        }
        let elapsed = self.started.elapsed();
        for change in &step.transitions {
            for listener in &self.listeners {
                listener.on_task_status_changed(&change.task, change.from, change.to, elapsed);
            }
        }
    }
}

impl<E: ExecutorBackend> WorkflowOrchestrator<E> {
    pub fn new(executor: E) -> Self {
        Self::from_arc(Arc::new(executor))
    }

    /// Share an executor with other orchestrators or callers.
    pub fn from_arc(executor: Arc<E>) -> Self {
        Self {
            executor,
            evaluator: Arc::new(ExprEvaluator),
            listeners: Vec::new(),
            sink: None,
        }
    }

    pub fn with_evaluator(mut self, evaluator: impl ConditionEvaluator) -> Self {
        self.evaluator = Arc::new(evaluator);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run every task of `graph` with at most `max_parallel` executing at
    /// once.
    ///
    /// Ordinary task failures never make this fail: they are reported in
    /// the returned [`WorkflowResult`]. With `stop_on_failure`, the first
    /// failure skips every task not yet started and the result is
    /// `Aborted`; tasks already running finish normally.
    pub async fn run(
        &self,
        graph: &TaskGraph,
        max_parallel: usize,
        stop_on_failure: bool,
    ) -> WorkflowResult {
        let max_parallel = if max_parallel == 0 {
            warn!("max_parallel = 0 is not valid; using 1");
            1
        } else {
            max_parallel
        };
        let workers = max_parallel.min(graph.len()).max(1);

        info!(
            tasks = graph.len(),
            levels = graph.levels().len(),
            max_parallel,
            workers,
            stop_on_failure,
            "workflow started"
        );

        let shared = Arc::new(Shared {
            scheduler: Mutex::new(Scheduler::new(graph, stop_on_failure)),
            wake: Notify::new(),
            started: Instant::now(),
            evaluator: Arc::clone(&self.evaluator),
            listeners: self.listeners.clone(),
        });

        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            pool.spawn(worker_loop(
                worker_id,
                Arc::clone(&shared),
                Arc::clone(&self.executor),
                self.sink.clone(),
            ));
        }

        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    error!(error = %err, "workflow worker terminated abnormally");
                    // Anything it left running will never complete; stop waiting.
                    pool.abort_all();
                }
            }
        }

        let (results, aborted) = {
            let scheduler = shared.scheduler.lock().await;
            (scheduler.results().clone(), scheduler.is_aborted())
        };
        let result = WorkflowResult::from_results(results, aborted, shared.started.elapsed());

        if let Some(sink) = &self.sink {
            sink.record(Record::Workflow(&result));
        }

        info!(
            status = %result.status,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            elapsed_ms = result.total_wall_time.as_millis() as u64,
            "workflow finished"
        );
        result
    }
}

async fn worker_loop<E: ExecutorBackend>(
    worker_id: usize,
    shared: Arc<Shared>,
    executor: Arc<E>,
    sink: Option<Arc<dyn ResultSink>>,
) {
    debug!(worker_id, "worker started");

    loop {
        // Register interest before looking at the scheduler so a wake-up
        // between the check and the wait is not lost.
        let notified = shared.wake.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let (step, finished) = {
            let mut scheduler = shared.scheduler.lock().await;
            let step = scheduler.claim_next(shared.evaluator.as_ref());
            shared.publish(&step);
            (step, scheduler.is_finished())
        };
        if !step.transitions.is_empty() {
            shared.wake.notify_waiters();
        }

        let Some(task) = step.dispatched else {
            if finished {
                break;
            }
            notified.await;
            continue;
        };

        debug!(worker_id, task = %task.id, "worker executing task");
        let result = executor.execute(&task.id, &task.request).await;

        if let Some(sink) = &sink {
            sink.record(Record::Execution {
                task_id: &task.id,
                result: &result,
            });
        }

        {
            let mut scheduler = shared.scheduler.lock().await;
            let step = scheduler.complete(&task.id, result);
            shared.publish(&step);
        }
        shared.wake.notify_waiters();
    }

    debug!(worker_id, "worker finished");
}
