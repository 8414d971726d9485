// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{RawWorkflowFile, WorkflowFile};
use crate::dag::{Task, TaskGraph};
use crate::errors::Result;
use crate::exec::EngineOptions;

/// Read a workflow document and deserialize it into the raw model.
///
/// No semantic validation happens here; use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawWorkflowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = contents.len(), "read workflow file");
    parse_raw(&contents)
}

pub fn parse_raw(contents: &str) -> Result<RawWorkflowFile> {
    Ok(toml::from_str(contents)?)
}

/// Read, deserialize and validate a workflow document.
///
/// The returned [`WorkflowFile`] has valid commands, durations, retry
/// policies and skip conditions. Graph structure is checked by
/// [`WorkflowFile::build_graph`].
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<WorkflowFile> {
    let raw = load_from_path(&path)?;
    WorkflowFile::try_from(raw)
}

/// Same as [`load_and_validate`] for a document already in memory.
pub fn parse_and_validate(contents: &str) -> Result<WorkflowFile> {
    WorkflowFile::try_from(parse_raw(contents)?)
}

/// `Dagvisor.toml` in the current directory.
pub fn default_workflow_path() -> PathBuf {
    PathBuf::from("Dagvisor.toml")
}

impl WorkflowFile {
    /// Owned copies of the tasks, ready for [`TaskGraph::build`].
    pub fn to_tasks(&self) -> Vec<Task> {
        self.tasks().to_vec()
    }

    /// Expand and validate the task graph.
    pub fn build_graph(&self) -> Result<TaskGraph> {
        TaskGraph::build(self.to_tasks())
    }

    /// Engine options implied by `[workflow]`.
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            sample_interval: self.settings.sample_interval,
            ..EngineOptions::default()
        }
    }
}
