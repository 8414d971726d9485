//! Shared helpers for the `dagvisor` integration tests.
//!
//! - [`builders`]: terse task and graph construction.
//! - [`fake_executor`]: an `ExecutorBackend` that sleeps instead of spawning.
//! - [`recorders`]: a progress listener and result sink that remember
//!   everything they are given.

pub mod builders;
pub mod fake_executor;
pub mod recorders;

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use tracing_subscriber::{EnvFilter, fmt};

pub use builders::{TaskBuilder, build_graph};
pub use fake_executor::{FakeExecutor, FakeOutcome};
pub use recorders::{MemorySink, RecordingListener, SinkEntry, Transition};

/// Upper bound for any single async test body.
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per test binary.
///
/// Output is captured per test and shown only for failures (or with
/// `--nocapture`). `RUST_LOG` picks the filter, `warn` otherwise.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Await `fut`, panicking if it takes longer than [`TEST_DEADLINE`].
pub async fn with_timeout<F: Future>(fut: F) -> F::Output {
    match tokio::time::timeout(TEST_DEADLINE, fut).await {
        Ok(out) => out,
        Err(_) => panic!("test exceeded {TEST_DEADLINE:?}"),
    }
}
