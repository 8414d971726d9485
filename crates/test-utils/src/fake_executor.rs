use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dagvisor::exec::{
    AttemptOutcome, AttemptRecord, ExecutionRequest, ExecutionResult, ExecutionStatus,
    ExecutorBackend,
};
use dagvisor::sampler::MetricsSummary;

/// Scripted outcome for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeOutcome {
    Success,
    Fail(i32),
    TimedOut,
    LaunchError,
}

#[derive(Debug, Clone, Copy)]
struct Script {
    outcome: FakeOutcome,
    delay: Duration,
}

#[derive(Debug, Default)]
struct Log {
    started: Vec<(String, Instant)>,
    finished: Vec<(String, Instant)>,
}

/// An executor that never launches anything:
/// - each task sleeps for its scripted delay and returns its scripted
///   outcome (default: immediate success),
/// - start and finish order is recorded,
/// - the highest number of concurrently executing tasks is tracked.
#[derive(Clone, Default)]
pub struct FakeExecutor {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    default_delay: Duration,
    log: Arc<Mutex<Log>>,
    current: Arc<AtomicUsize>,
    max_seen: Arc<AtomicUsize>,
}

impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to tasks without their own script.
    pub fn with_default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub fn script(self, task: &str, outcome: FakeOutcome, delay: Duration) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(task.to_string(), Script { outcome, delay });
        self
    }

    pub fn fail(self, task: &str, code: i32) -> Self {
        self.script(task, FakeOutcome::Fail(code), Duration::ZERO)
    }

    pub fn started(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .started
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn finished(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap()
            .finished
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    pub fn started_at(&self, task: &str) -> Option<Instant> {
        let log = self.log.lock().unwrap();
        log.started.iter().find(|(t, _)| t == task).map(|(_, at)| *at)
    }

    pub fn finished_at(&self, task: &str) -> Option<Instant> {
        let log = self.log.lock().unwrap();
        log.finished.iter().find(|(t, _)| t == task).map(|(_, at)| *at)
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    fn script_for(&self, task: &str) -> Script {
        self.scripts
            .lock()
            .unwrap()
            .get(task)
            .copied()
            .unwrap_or(Script {
                outcome: FakeOutcome::Success,
                delay: self.default_delay,
            })
    }
}

impl ExecutorBackend for FakeExecutor {
    fn execute<'a>(
        &'a self,
        task_id: &'a str,
        _request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>> {
        Box::pin(async move {
            let script = self.script_for(task_id);
            let begun = Instant::now();

            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .started
                .push((task_id.to_string(), begun));

            if !script.delay.is_zero() {
                tokio::time::sleep(script.delay).await;
            }

            self.current.fetch_sub(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .finished
                .push((task_id.to_string(), Instant::now()));

            fake_result(script.outcome, begun.elapsed())
        })
    }
}

/// Single-attempt result with an unsampled summary.
pub fn fake_result(outcome: FakeOutcome, elapsed: Duration) -> ExecutionResult {
    let (attempt_outcome, status) = match outcome {
        FakeOutcome::Success => (
            AttemptOutcome::Exited {
                code: Some(0),
                success: true,
            },
            ExecutionStatus::Success,
        ),
        FakeOutcome::Fail(code) => (
            AttemptOutcome::Exited {
                code: Some(code),
                success: false,
            },
            ExecutionStatus::Failed,
        ),
        FakeOutcome::TimedOut => (AttemptOutcome::TimedOut, ExecutionStatus::TimedOut),
        FakeOutcome::LaunchError => (
            AttemptOutcome::LaunchFailed {
                message: "fake launch error".to_string(),
            },
            ExecutionStatus::LaunchError,
        ),
    };

    let mut metrics = MetricsSummary::unsampled();
    metrics.wall_time = elapsed;
    if let AttemptOutcome::Exited { code, success } = attempt_outcome {
        metrics.exit_code = code;
        metrics.success = success;
    }

    ExecutionResult {
        status,
        attempts: vec![AttemptRecord {
            attempt: 1,
            outcome: attempt_outcome,
            metrics,
        }],
        retry_delays: Vec::new(),
        total_elapsed: elapsed,
        exhausted: !status.is_success() && status != ExecutionStatus::LaunchError,
    }
}
