// src/config/mod.rs

//! Workflow document loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a workflow file from disk (`loader.rs`).
//! - Validate commands, durations, retry policies and skip conditions, and
//!   turn each `[task.<id>]` into a [`Task`](crate::dag::Task)
//!   (`validate.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{
    default_workflow_path, load_and_validate, load_from_path, parse_and_validate, parse_raw,
};
pub use model::{RawWorkflowFile, WorkflowFile, WorkflowSettings};
