// src/engine/mod.rs

//! Workflow orchestration.
//!
//! This module ties together:
//! - the pure DAG [`Scheduler`](crate::dag::Scheduler), kept behind one
//!   mutex,
//! - a bounded pool of workers, each running tasks through an
//!   [`ExecutorBackend`](crate::exec::ExecutorBackend),
//! - the outward seams: [`ProgressListener`] for status transitions and
//!   [`ResultSink`] for terminal results.
//!
//! The async shell lives in [`orchestrator`].

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dag::TaskState;
use crate::exec::ExecutionResult;

pub mod orchestrator;
pub mod result;

pub use orchestrator::WorkflowOrchestrator;
pub use result::{WorkflowResult, WorkflowStatus};

/// Receives every task status transition.
///
/// Called with the scheduler lock held, in the order transitions happen;
/// implementations must be quick and must not block.
pub trait ProgressListener: Send + Sync + 'static {
    /// `elapsed` is measured from the start of the workflow run.
    fn on_task_status_changed(
        &self,
        task_id: &str,
        old_status: TaskState,
        new_status: TaskState,
        elapsed: Duration,
    );
}

/// Terminal outcome handed to a [`ResultSink`].
#[derive(Debug, Clone, Copy)]
pub enum Record<'a> {
    /// One task finished executing (not emitted for skipped tasks).
    Execution {
        task_id: &'a str,
        result: &'a ExecutionResult,
    },
    /// The whole workflow finished.
    Workflow(&'a WorkflowResult),
}

/// Consumer of terminal outcomes, such as a history store.
pub trait ResultSink: Send + Sync + 'static {
    fn record(&self, record: Record<'_>);
}

/// Logs every transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressListener for TracingProgress {
    fn on_task_status_changed(
        &self,
        task_id: &str,
        old_status: TaskState,
        new_status: TaskState,
        elapsed: Duration,
    ) {
        debug!(
            task = %task_id,
            from = %old_status,
            to = %new_status,
            elapsed_ms = elapsed.as_millis() as u64,
            "task status changed"
        );
    }
}

/// Logs terminal results through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ResultSink for TracingSink {
    fn record(&self, record: Record<'_>) {
        match record {
            Record::Execution { task_id, result } if result.is_success() => info!(
                task = %task_id,
                attempts = result.attempt_count(),
                elapsed_ms = result.total_elapsed.as_millis() as u64,
                peak_memory_bytes = result.peak_memory_bytes(),
                "task execution finished"
            ),
            Record::Execution { task_id, result } => warn!(
                task = %task_id,
                status = %result.status,
                attempts = result.attempt_count(),
                exit_code = ?result.exit_code(),
                launch_error = ?result.launch_error(),
                elapsed_ms = result.total_elapsed.as_millis() as u64,
                "task execution failed"
            ),
            Record::Workflow(result) => info!(
                status = %result.status,
                succeeded = result.succeeded,
                failed = result.failed,
                skipped = result.skipped,
                elapsed_ms = result.total_wall_time.as_millis() as u64,
                "workflow finished"
            ),
        }
    }
}
