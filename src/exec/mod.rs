// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`request`] describes what to run ([`ExecutionRequest`]).
//! - [`backoff`] holds [`RetryPolicy`] and the pure [`next_delay`] function.
//! - [`process`] launches and supervises a single attempt, including
//!   timeout enforcement and process-tree kill.
//! - [`engine`] is the retrying state machine ([`ExecutionEngine`]).
//! - [`result`] holds the attempt and execution outcome types.
//! - [`backend`] provides the `ExecutorBackend` seam the orchestrator uses,
//!   which tests replace with a fake.

pub mod backend;
pub mod backoff;
pub mod engine;
pub mod process;
pub mod request;
pub mod result;

pub use backend::ExecutorBackend;
pub use backoff::{BackoffStrategy, RetryPolicy, next_delay};
pub use engine::{EngineOptions, ExecutionEngine, ExecutionState};
pub use request::ExecutionRequest;
pub use result::{AttemptOutcome, AttemptRecord, ExecutionResult, ExecutionStatus};
