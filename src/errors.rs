// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Only structural problems are errors here. Ordinary task outcomes (launch
//! failures, nonzero exits, timeouts) are data carried by
//! [`crate::exec::ExecutionStatus`] and never surface as `Err`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagvisorError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    #[error("Cycle detected in task graph: {}", .members.join(" -> "))]
    CycleDetected { members: Vec<String> },

    #[error("task '{task}' depends on unknown task '{dependency}'")]
    DanglingDependency { task: String, dependency: String },

    #[error("Matrix expansion failed for task '{task}': {reason}")]
    MatrixExpansion { task: String, reason: String },

    #[error("Invalid retry policy: {0}")]
    InvalidRetryPolicy(String),

    #[error("Invalid condition '{expression}': {reason}")]
    InvalidCondition { expression: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DagvisorError {
    /// Whether this error came from graph validation (cycle, dangling
    /// dependency, bad matrix). Such errors reject the whole submission.
    pub fn is_graph_error(&self) -> bool {
        matches!(
            self,
            DagvisorError::CycleDetected { .. }
                | DagvisorError::DanglingDependency { .. }
                | DagvisorError::MatrixExpansion { .. }
                | DagvisorError::DuplicateTask(_)
        )
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagvisorError>;
