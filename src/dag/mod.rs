// src/dag/mod.rs

//! Task graph representation and scheduling.
//!
//! - [`task`] and [`matrix`] describe tasks as submitted, and how matrix
//!   tasks expand into concrete instances.
//! - [`graph`] builds and validates the [`TaskGraph`] (acyclic, fully
//!   resolved dependencies) and computes its levels.
//! - [`scheduler`] contains the per-run state machine that decides which
//!   tasks are ready, skipped or finished.
//! - [`task_info`] provides task states, results and scheduled task types.
//! - [`scheduler_step`] defines the result type for scheduler steps.
//! - [`state_manager`] applies per-task state transitions.

pub mod graph;
pub mod matrix;
pub mod scheduler;
pub mod scheduler_step;
pub(crate) mod state_manager;
pub mod task;
pub mod task_info;

pub use graph::TaskGraph;
pub use matrix::Matrix;
pub use scheduler::Scheduler;
pub use scheduler_step::{SchedulerStep, StatusChange};
pub use task::{Task, TaskId};
pub use task_info::{ScheduledTask, SkipReason, TaskResult, TaskState};
