#![allow(dead_code, unused_imports)]

use std::time::Duration;

use dagvisor::exec::{BackoffStrategy, RetryPolicy};

pub use dagvisor_test_utils::builders::{TaskBuilder, build_graph, diamond, independent};
pub use dagvisor_test_utils::fake_executor::fake_result;
pub use dagvisor_test_utils::{
    FakeExecutor, FakeOutcome, MemorySink, RecordingListener, init_tracing, with_timeout,
};

pub fn policy(strategy: BackoffStrategy, attempts: u32, base_ms: u64, max_ms: u64) -> RetryPolicy {
    RetryPolicy::new(
        strategy,
        attempts,
        Duration::from_millis(base_ms),
        Some(Duration::from_millis(max_ms)),
    )
    .expect("valid retry policy")
}
