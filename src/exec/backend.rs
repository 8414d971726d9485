// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The orchestrator's workers talk to an `ExecutorBackend` instead of the
//! [`ExecutionEngine`] directly. Production uses the engine; tests swap in a
//! scripted fake that never spawns processes.

use std::future::Future;
use std::pin::Pin;

use crate::exec::engine::ExecutionEngine;
use crate::exec::request::ExecutionRequest;
use crate::exec::result::ExecutionResult;

/// Runs one task's request to a terminal [`ExecutionResult`].
///
/// Implementations must be shareable across workers (`Send + Sync`) and
/// must not fail: every outcome, including launch problems, is a result.
pub trait ExecutorBackend: Send + Sync + 'static {
    fn execute<'a>(
        &'a self,
        task_id: &'a str,
        request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>>;
}

impl ExecutorBackend for ExecutionEngine {
    fn execute<'a>(
        &'a self,
        task_id: &'a str,
        request: &'a ExecutionRequest,
    ) -> Pin<Box<dyn Future<Output = ExecutionResult> + Send + 'a>> {
        Box::pin(self.execute_labelled(task_id, request))
    }
}
