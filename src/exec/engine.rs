// src/exec/engine.rs

//! Drives one request end-to-end: launch, sample, timeout, classify, retry.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use crate::exec::backoff::next_delay;
use crate::exec::process::run_attempt;
use crate::exec::request::ExecutionRequest;
use crate::exec::result::{AttemptRecord, ExecutionResult, ExecutionStatus};
use crate::sampler::DEFAULT_INTERVAL;

/// Lifecycle of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Launching,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    LaunchError,
    AwaitingRetry,
    Exhausted,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Engine-wide knobs. The engine holds no other state.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub sample_interval: Duration,
    /// Seed for the jitter random source, mixed with the task label so
    /// concurrent tasks draw different delays. `None` seeds from OS entropy
    /// on every `execute` call.
    pub jitter_seed: Option<u64>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            sample_interval: DEFAULT_INTERVAL,
            jitter_seed: None,
        }
    }
}

/// Stateless process supervisor.
///
/// `execute` can be called concurrently from many tasks: every call owns
/// its own child process, sampler and random source.
#[derive(Debug, Clone, Default)]
pub struct ExecutionEngine {
    options: EngineOptions,
}

impl ExecutionEngine {
    pub fn new(options: EngineOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run `request` until it succeeds, fails terminally, or runs out of
    /// attempts.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionResult {
        self.execute_labelled(&request.program, request).await
    }

    /// Same as [`execute`](Self::execute), tagging logs with `label`
    /// (usually the task id).
    pub async fn execute_labelled(
        &self,
        label: &str,
        request: &ExecutionRequest,
    ) -> ExecutionResult {
        let policy = request.effective_retry();
        let mut rng = match self.options.jitter_seed {
            Some(seed) => StdRng::seed_from_u64(label_seed(seed, label)),
            None => StdRng::from_entropy(),
        };

        let started = Instant::now();
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut retry_delays: Vec<Duration> = Vec::new();
        let mut state = ExecutionState::Idle;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            transition(label, &mut state, ExecutionState::Launching);

            let (outcome, metrics) = run_attempt(
                label,
                attempt,
                request,
                self.options.sample_interval,
                || transition(label, &mut state, ExecutionState::Running),
            )
            .await;

            let retryable = outcome.is_retryable();
            let terminal = match outcome.status() {
                ExecutionStatus::Success => ExecutionState::Succeeded,
                ExecutionStatus::Failed => ExecutionState::Failed,
                ExecutionStatus::TimedOut => ExecutionState::TimedOut,
                ExecutionStatus::LaunchError => ExecutionState::LaunchError,
            };
            transition(label, &mut state, terminal);

            let status = outcome.status();
            attempts.push(AttemptRecord {
                attempt,
                outcome,
                metrics,
            });

            if !retryable {
                return finish(label, status, attempts, retry_delays, started, false);
            }

            if !policy.allows_retry_after(attempt) {
                if policy.max_attempts() > 1 {
                    warn!(
                        task = %label,
                        attempts = attempt,
                        "retries exhausted"
                    );
                }
                transition(label, &mut state, ExecutionState::Exhausted);
                return finish(label, status, attempts, retry_delays, started, true);
            }

            let delay = next_delay(attempt, &policy, &mut rng);
            info!(
                task = %label,
                attempt,
                max_attempts = policy.max_attempts(),
                strategy = %policy.strategy(),
                delay_ms = delay.as_millis() as u64,
                "attempt failed; retrying after backoff"
            );
            transition(label, &mut state, ExecutionState::AwaitingRetry);
            tokio::time::sleep(delay).await;
            retry_delays.push(delay);
        }
    }
}

/// Per-task jitter seed: the configured seed combined with `label`.
pub fn label_seed(seed: u64, label: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    label.hash(&mut hasher);
    seed ^ hasher.finish()
}

fn transition(label: &str, state: &mut ExecutionState, next: ExecutionState) {
    debug!(task = %label, from = %state, to = %next, "execution state");
    *state = next;
}

fn finish(
    label: &str,
    status: ExecutionStatus,
    attempts: Vec<AttemptRecord>,
    retry_delays: Vec<Duration>,
    started: Instant,
    exhausted: bool,
) -> ExecutionResult {
    let result = ExecutionResult {
        status,
        attempts,
        retry_delays,
        total_elapsed: started.elapsed(),
        exhausted,
    };
    debug!(
        task = %label,
        status = %result.status,
        attempts = result.attempt_count(),
        elapsed_ms = result.total_elapsed.as_millis() as u64,
        "execution finished"
    );
    result
}
