use std::sync::Mutex;
use std::time::Duration;

use dagvisor::dag::TaskState;
use dagvisor::engine::{ProgressListener, Record, ResultSink, WorkflowResult};
use dagvisor::exec::ExecutionResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub task: String,
    pub from: TaskState,
    pub to: TaskState,
    pub elapsed: Duration,
}

/// Progress listener that keeps every transition in order.
#[derive(Debug, Default)]
pub struct RecordingListener {
    transitions: Mutex<Vec<Transition>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transitions(&self) -> Vec<Transition> {
        self.transitions.lock().unwrap().clone()
    }

    /// States `task` passed through, starting with the first `from`.
    pub fn path_of(&self, task: &str) -> Vec<TaskState> {
        let transitions = self.transitions();
        let mine: Vec<&Transition> = transitions.iter().filter(|t| t.task == task).collect();
        let mut path = Vec::new();
        if let Some(first) = mine.first() {
            path.push(first.from);
        }
        path.extend(mine.iter().map(|t| t.to));
        path
    }

    /// Index in the global transition log at which `task` entered `state`.
    pub fn position(&self, task: &str, state: TaskState) -> Option<usize> {
        self.transitions()
            .iter()
            .position(|t| t.task == task && t.to == state)
    }
}

impl ProgressListener for RecordingListener {
    fn on_task_status_changed(
        &self,
        task_id: &str,
        old_status: TaskState,
        new_status: TaskState,
        elapsed: Duration,
    ) {
        self.transitions.lock().unwrap().push(Transition {
            task: task_id.to_string(),
            from: old_status,
            to: new_status,
            elapsed,
        });
    }
}

/// Owned copy of a [`Record`].
#[derive(Debug, Clone)]
pub enum SinkEntry {
    Execution {
        task_id: String,
        result: ExecutionResult,
    },
    Workflow(WorkflowResult),
}

/// Result sink that stores everything in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<Vec<SinkEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<SinkEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn execution_ids(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter_map(|e| match e {
                SinkEntry::Execution { task_id, .. } => Some(task_id),
                SinkEntry::Workflow(_) => None,
            })
            .collect()
    }

    pub fn workflow_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|e| matches!(e, SinkEntry::Workflow(_)))
            .count()
    }
}

impl ResultSink for MemorySink {
    fn record(&self, record: Record<'_>) {
        let entry = match record {
            Record::Execution { task_id, result } => SinkEntry::Execution {
                task_id: task_id.to_string(),
                result: result.clone(),
            },
            Record::Workflow(result) => SinkEntry::Workflow(result.clone()),
        };
        self.entries.lock().unwrap().push(entry);
    }
}
