// tests/backoff.rs

mod common;
use crate::common::policy;

use std::time::Duration;

use dagvisor::errors::DagvisorError;
use dagvisor::exec::engine::label_seed;
use dagvisor::exec::{BackoffStrategy, RetryPolicy, next_delay};
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn delays(p: &RetryPolicy, attempts: u32) -> Vec<Duration> {
    let mut rng = StdRng::seed_from_u64(7);
    (1..=attempts).map(|a| next_delay(a, p, &mut rng)).collect()
}

fn ms(v: &[u64]) -> Vec<Duration> {
    v.iter().map(|&m| Duration::from_millis(m)).collect()
}

#[test]
fn linear_grows_by_base_each_attempt() {
    let p = policy(BackoffStrategy::Linear, 5, 100, 10_000);
    assert_eq!(delays(&p, 4), ms(&[100, 200, 300, 400]));
}

#[test]
fn exponential_doubles_and_caps() {
    let p = policy(BackoffStrategy::Exponential, 10, 1000, 5000);
    assert_eq!(delays(&p, 5), ms(&[1000, 2000, 4000, 5000, 5000]));
}

#[test]
fn fibonacci_follows_sequence_and_caps() {
    let p = policy(BackoffStrategy::Fibonacci, 10, 10, 70);
    assert_eq!(delays(&p, 7), ms(&[10, 10, 20, 30, 50, 70, 70]));
}

#[test]
fn none_strategy_is_zero_and_single_attempt() {
    let p = RetryPolicy::new(BackoffStrategy::None, 5, Duration::from_secs(1), None).unwrap();
    assert_eq!(p, RetryPolicy::none());
    assert_eq!(p.max_attempts(), 1);
    assert!(!p.allows_retry_after(1));
    assert_eq!(delays(&p, 3), vec![Duration::ZERO; 3]);
}

#[test]
fn jitter_stays_within_capped_exponential() {
    let p = policy(BackoffStrategy::ExponentialJitter, 10, 100, 1000);
    let mut rng = StdRng::seed_from_u64(42);
    for attempt in 1..=8u32 {
        let ceiling =
            Duration::from_millis(100 * 2u64.pow(attempt - 1)).min(Duration::from_millis(1000));
        for _ in 0..50 {
            let d = next_delay(attempt, &p, &mut rng);
            assert!(d <= ceiling, "attempt {attempt}: {d:?} > {ceiling:?}");
        }
    }
}

#[test]
fn jitter_is_reproducible_with_the_same_seed() {
    let p = policy(BackoffStrategy::ExponentialJitter, 10, 100, 10_000);
    let mut a = StdRng::seed_from_u64(99);
    let mut b = StdRng::seed_from_u64(99);
    let left: Vec<_> = (1..=6).map(|n| next_delay(n, &p, &mut a)).collect();
    let right: Vec<_> = (1..=6).map(|n| next_delay(n, &p, &mut b)).collect();
    assert_eq!(left, right);
}

#[test]
fn seeded_jitter_differs_between_tasks() {
    let p = policy(BackoffStrategy::ExponentialJitter, 10, 100, 100_000);
    let draw = |label: &str| -> Vec<Duration> {
        let mut rng = StdRng::seed_from_u64(label_seed(42, label));
        (1..=8).map(|n| next_delay(n, &p, &mut rng)).collect()
    };

    assert_eq!(label_seed(42, "build"), label_seed(42, "build"));
    assert_ne!(label_seed(42, "build"), label_seed(42, "test"));
    assert_eq!(draw("build"), draw("build"), "same task, same delays");
    assert_ne!(draw("build"), draw("test"), "different tasks must not retry in lockstep");
}

#[test]
fn construction_rejects_bad_values() {
    let zero_attempts = RetryPolicy::new(BackoffStrategy::Linear, 0, Duration::from_secs(1), None);
    assert!(matches!(zero_attempts, Err(DagvisorError::InvalidRetryPolicy(_))));

    let zero_attempts_none = RetryPolicy::new(BackoffStrategy::None, 0, Duration::ZERO, None);
    assert!(matches!(zero_attempts_none, Err(DagvisorError::InvalidRetryPolicy(_))));

    let zero_base = RetryPolicy::new(BackoffStrategy::Exponential, 3, Duration::ZERO, None);
    assert!(matches!(zero_base, Err(DagvisorError::InvalidRetryPolicy(_))));

    let cap_below_base = RetryPolicy::new(
        BackoffStrategy::Fibonacci,
        3,
        Duration::from_secs(2),
        Some(Duration::from_secs(1)),
    );
    assert!(matches!(cap_below_base, Err(DagvisorError::InvalidRetryPolicy(_))));
}

#[test]
fn max_attempts_one_means_no_retry() {
    let p = policy(BackoffStrategy::Exponential, 1, 100, 1000);
    assert!(!p.allows_retry_after(1));

    let p = policy(BackoffStrategy::Exponential, 3, 100, 1000);
    assert!(p.allows_retry_after(1));
    assert!(p.allows_retry_after(2));
    assert!(!p.allows_retry_after(3));
}

#[test]
fn strategy_names_parse() {
    for (text, expected) in [
        ("none", BackoffStrategy::None),
        ("Linear", BackoffStrategy::Linear),
        ("exponential", BackoffStrategy::Exponential),
        ("fibonacci", BackoffStrategy::Fibonacci),
        ("exponential-with-jitter", BackoffStrategy::ExponentialJitter),
        ("exponential_jitter", BackoffStrategy::ExponentialJitter),
    ] {
        assert_eq!(text.parse::<BackoffStrategy>().unwrap(), expected, "{text}");
    }
    assert!("quadratic".parse::<BackoffStrategy>().is_err());
}

proptest! {
    #[test]
    fn deterministic_strategies_are_pure(
        attempt in 1u32..40,
        base_ms in 1u64..5_000,
        cap_factor in 1u64..100,
        which in 0usize..3,
    ) {
        let strategy = [
            BackoffStrategy::Linear,
            BackoffStrategy::Exponential,
            BackoffStrategy::Fibonacci,
        ][which];
        let p = policy(strategy, 50, base_ms, base_ms * cap_factor);
        let mut r1 = StdRng::seed_from_u64(1);
        let mut r2 = StdRng::seed_from_u64(2);
        let first = next_delay(attempt, &p, &mut r1);
        prop_assert_eq!(first, next_delay(attempt, &p, &mut r2));
        prop_assert!(first <= p.max_delay());
        prop_assert!(first >= p.base_delay());
    }
}
