// src/exec/backoff.rs

//! Retry policy and backoff delay computation.
//!
//! [`next_delay`] is a pure function of `(attempt, policy)` for every
//! strategy except [`BackoffStrategy::ExponentialJitter`], which draws from
//! the caller-supplied random source. Pass a seeded `StdRng` for
//! reproducible delays.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::errors::{DagvisorError, Result};

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    /// Never retry; the first attempt is terminal.
    None,
    /// `base * attempt`.
    Linear,
    /// `base * 2^(attempt - 1)`.
    Exponential,
    /// `base * fib(attempt)` with `fib = 1, 1, 2, 3, 5, ...`.
    Fibonacci,
    /// Exponential value, then uniformly drawn from `[0, value]`.
    ExponentialJitter,
}

impl fmt::Display for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackoffStrategy::None => "none",
            BackoffStrategy::Linear => "linear",
            BackoffStrategy::Exponential => "exponential",
            BackoffStrategy::Fibonacci => "fibonacci",
            BackoffStrategy::ExponentialJitter => "exponential-jitter",
        };
        f.write_str(s)
    }
}

impl FromStr for BackoffStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "none" => Ok(BackoffStrategy::None),
            "linear" => Ok(BackoffStrategy::Linear),
            "exponential" => Ok(BackoffStrategy::Exponential),
            "fibonacci" => Ok(BackoffStrategy::Fibonacci),
            "exponential-jitter" | "exponential-with-jitter" | "jitter" => {
                Ok(BackoffStrategy::ExponentialJitter)
            }
            other => Err(format!(
                "unknown retry strategy '{other}' (expected none, linear, exponential, fibonacci or exponential-jitter)"
            )),
        }
    }
}

/// Validated retry configuration for one execution request.
///
/// Fields are private so the invariants checked in [`RetryPolicy::new`]
/// (`max_attempts >= 1`, `base_delay > 0`, `max_delay >= base_delay`)
/// always hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    strategy: BackoffStrategy,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy, rejecting zero attempts and a zero base delay.
    ///
    /// `max_delay` defaults to `base_delay * 2^16` when `None`; a cap below
    /// the base delay is rejected.
    pub fn new(
        strategy: BackoffStrategy,
        max_attempts: u32,
        base_delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<Self> {
        if max_attempts == 0 {
            return Err(DagvisorError::InvalidRetryPolicy(
                "max_attempts must be >= 1 (got 0)".to_string(),
            ));
        }
        if strategy == BackoffStrategy::None {
            return Ok(Self::none());
        }
        if base_delay.is_zero() {
            return Err(DagvisorError::InvalidRetryPolicy(format!(
                "base_delay must be positive for strategy '{strategy}'"
            )));
        }

        let max_delay = max_delay.unwrap_or_else(|| base_delay.saturating_mul(1 << 16));
        if max_delay < base_delay {
            return Err(DagvisorError::InvalidRetryPolicy(format!(
                "max_delay ({max_delay:?}) must be >= base_delay ({base_delay:?})"
            )));
        }

        Ok(Self {
            strategy,
            max_attempts,
            base_delay,
            max_delay,
        })
    }

    /// Single attempt, no delay.
    pub const fn none() -> Self {
        Self {
            strategy: BackoffStrategy::None,
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn strategy(&self) -> BackoffStrategy {
        self.strategy
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Whether a retry is permitted after `attempt` (1-indexed) failed.
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        self.strategy != BackoffStrategy::None && attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Delay to wait after `attempt` (1-indexed) failed, before the next one.
///
/// Attempt numbers below 1 are treated as 1. The random source is only
/// consulted by [`BackoffStrategy::ExponentialJitter`].
pub fn next_delay<R: Rng + ?Sized>(attempt: u32, policy: &RetryPolicy, rng: &mut R) -> Duration {
    let attempt = attempt.max(1);
    let base = policy.base_delay;
    let cap = policy.max_delay;

    match policy.strategy {
        BackoffStrategy::None => Duration::ZERO,
        BackoffStrategy::Linear => base.saturating_mul(attempt).min(cap),
        BackoffStrategy::Exponential => exponential(base, attempt).min(cap),
        BackoffStrategy::Fibonacci => base.saturating_mul(fibonacci(attempt)).min(cap),
        BackoffStrategy::ExponentialJitter => {
            let ceiling = exponential(base, attempt).min(cap);
            let nanos = u64::try_from(ceiling.as_nanos()).unwrap_or(u64::MAX);
            Duration::from_nanos(rng.gen_range(0..=nanos))
        }
    }
}

fn exponential(base: Duration, attempt: u32) -> Duration {
    // 2^31 already overflows any sane cap; saturate instead of shifting past it.
    let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// `fib(1) = fib(2) = 1`, saturating at `u32::MAX`.
fn fibonacci(n: u32) -> u32 {
    let (mut prev, mut cur) = (0u32, 1u32);
    for _ in 1..n {
        let next = prev.saturating_add(cur);
        prev = cur;
        cur = next;
    }
    cur
}
