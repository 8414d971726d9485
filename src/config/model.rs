// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::Task;

/// Top-level workflow document as read from TOML.
///
/// ```toml
/// [workflow]
/// max_parallel = 4
/// stop_on_failure = false
///
/// [defaults]
/// timeout = "10m"
///
/// [task.build]
/// cmd = "make build"
/// depends_on = ["fetch"]
/// ```
///
/// Only the shape is checked here. Semantic validation happens in
/// `TryFrom<RawWorkflowFile> for WorkflowFile`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflowFile {
    #[serde(default)]
    pub workflow: RawWorkflowSection,

    #[serde(default)]
    pub defaults: RawDefaults,

    /// All tasks from `[task.<id>]`, keyed by id.
    #[serde(default)]
    pub task: BTreeMap<String, RawTask>,
}

/// `[workflow]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawWorkflowSection {
    pub max_parallel: Option<usize>,
    pub stop_on_failure: Option<bool>,
    /// Resource sampling interval, e.g. `"100ms"`.
    pub sample_interval: Option<String>,
}

/// `[defaults]` section, applied to tasks that do not set the field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDefaults {
    pub timeout: Option<String>,
    pub retry: Option<RawRetry>,
    pub cwd: Option<String>,
    /// Merged under each task's own `env`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// `[task.<id>.retry]` / `[defaults.retry]`.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawRetry {
    pub strategy: String,
    pub max_attempts: Option<u32>,
    pub base_delay: Option<String>,
    pub max_delay: Option<String>,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTask {
    /// Shell form: run through `sh -c` (`cmd /C` on Windows).
    pub cmd: Option<String>,
    /// Direct form: executable plus `args`.
    pub program: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    pub timeout: Option<String>,
    #[serde(default, alias = "after")]
    pub depends_on: Vec<String>,
    pub skip_if: Option<String>,
    #[serde(default)]
    pub run_always: bool,
    pub matrix: Option<BTreeMap<String, Vec<MatrixValue>>>,
    pub retry: Option<RawRetry>,
}

/// A matrix value as written in TOML. Numbers and booleans are accepted
/// and used in their textual form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MatrixValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for MatrixValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixValue::Text(s) => f.write_str(s),
            MatrixValue::Integer(i) => write!(f, "{i}"),
            MatrixValue::Float(x) => write!(f, "{x}"),
            MatrixValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Validated `[workflow]` settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub max_parallel: usize,
    pub stop_on_failure: bool,
    pub sample_interval: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_parallel: 4,
            stop_on_failure: false,
            sample_interval: crate::sampler::DEFAULT_INTERVAL,
        }
    }
}

/// Validated workflow document.
///
/// Only `TryFrom<RawWorkflowFile>` builds one, so every task has a valid
/// command, retry policy and parsed skip condition. Graph-level checks
/// (cycles, dangling dependencies, matrices) happen in
/// [`WorkflowFile::build_graph`].
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub settings: WorkflowSettings,
    tasks: Vec<Task>,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(settings: WorkflowSettings, tasks: Vec<Task>) -> Self {
        Self { settings, tasks }
    }

    /// Tasks as written (matrix tasks not yet expanded), sorted by id.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }
}
