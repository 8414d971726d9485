// src/exec/result.rs

use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::sampler::MetricsSummary;

/// Terminal classification of an execution (after all retries).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    /// Nonzero exit (or killed by a signal) on the last attempt.
    Failed,
    /// Wall-clock timeout on the last attempt.
    TimedOut,
    /// The command could not be started at all. Never retried.
    LaunchError,
}

impl ExecutionStatus {
    pub fn is_success(self) -> bool {
        self == ExecutionStatus::Success
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::TimedOut => "timed_out",
            ExecutionStatus::LaunchError => "launch_error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum AttemptOutcome {
    /// Process exited by itself. `code` is `None` when killed by a signal.
    Exited { code: Option<i32>, success: bool },
    TimedOut,
    LaunchFailed { message: String },
}

impl AttemptOutcome {
    /// Runtime failures and timeouts may be retried; launch errors and
    /// successes may not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AttemptOutcome::Exited { success, .. } => !success,
            AttemptOutcome::TimedOut => true,
            AttemptOutcome::LaunchFailed { .. } => false,
        }
    }

    pub fn status(&self) -> ExecutionStatus {
        match self {
            AttemptOutcome::Exited { success: true, .. } => ExecutionStatus::Success,
            AttemptOutcome::Exited { success: false, .. } => ExecutionStatus::Failed,
            AttemptOutcome::TimedOut => ExecutionStatus::TimedOut,
            AttemptOutcome::LaunchFailed { .. } => ExecutionStatus::LaunchError,
        }
    }
}

/// Record of one attempt: its outcome and what the sampler measured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    /// 1-indexed.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub metrics: MetricsSummary,
}

/// Terminal outcome of one request's attempt sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    /// Full per-attempt history, in order. Never empty.
    pub attempts: Vec<AttemptRecord>,
    /// Backoff delays slept between attempts (`attempts.len() - 1` entries).
    pub retry_delays: Vec<Duration>,
    pub total_elapsed: Duration,
    /// `true` when the last attempt failed and no attempts remained.
    pub exhausted: bool,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.len() as u32
    }

    /// Per-attempt metrics, in attempt order.
    pub fn metrics(&self) -> impl Iterator<Item = &MetricsSummary> {
        self.attempts.iter().map(|a| &a.metrics)
    }

    pub fn last_attempt(&self) -> Option<&AttemptRecord> {
        self.attempts.last()
    }

    /// Exit code of the last attempt, if it exited normally.
    pub fn exit_code(&self) -> Option<i32> {
        match self.last_attempt().map(|a| &a.outcome) {
            Some(AttemptOutcome::Exited { code, .. }) => *code,
            _ => None,
        }
    }

    pub fn launch_error(&self) -> Option<&str> {
        match self.last_attempt().map(|a| &a.outcome) {
            Some(AttemptOutcome::LaunchFailed { message }) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn peak_memory_bytes(&self) -> u64 {
        self.metrics()
            .map(MetricsSummary::peak_memory_bytes)
            .max()
            .unwrap_or(0)
    }

    pub fn max_cpu_percent(&self) -> f64 {
        self.metrics().map(|m| m.cpu_percent.max).fold(0.0, f64::max)
    }

    /// Mean of the per-attempt CPU averages over sampled attempts.
    pub fn avg_cpu_percent(&self) -> f64 {
        let sampled: Vec<f64> = self
            .metrics()
            .filter(|m| m.sampled)
            .map(|m| m.cpu_percent.avg)
            .collect();
        if sampled.is_empty() {
            0.0
        } else {
            sampled.iter().sum::<f64>() / sampled.len() as f64
        }
    }
}
