// src/dag/task.rs

use std::collections::BTreeMap;

use serde::Serialize;

use crate::condition::SkipCondition;
use crate::dag::matrix::Matrix;
use crate::errors::Result;
use crate::exec::ExecutionRequest;

pub type TaskId = String;

/// One node of a workflow, before or after matrix expansion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub request: ExecutionRequest,
    /// Ids this task waits on. May name an unexpanded matrix task, meaning
    /// every one of its expansions.
    pub depends_on: Vec<TaskId>,
    pub skip_if: Option<SkipCondition>,
    /// Become ready once every dependency is terminal, whatever the outcome,
    /// instead of being skipped when one fails.
    pub run_always: bool,
    pub matrix: Option<Matrix>,
    /// For an expanded instance: the template id and the values it was
    /// expanded with.
    pub template: Option<TaskId>,
    pub matrix_values: BTreeMap<String, String>,
}

impl Task {
    pub fn new(id: impl Into<TaskId>, request: ExecutionRequest) -> Self {
        Self {
            id: id.into(),
            request,
            depends_on: Vec::new(),
            skip_if: None,
            run_always: false,
            matrix: None,
            template: None,
            matrix_values: BTreeMap::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.depends_on.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn skip_if(mut self, condition: SkipCondition) -> Self {
        self.skip_if = Some(condition);
        self
    }

    /// Parse `expression` and attach it as this task's skip condition.
    pub fn skip_if_expr(self, expression: &str) -> Result<Self> {
        Ok(self.skip_if(SkipCondition::parse(expression)?))
    }

    pub fn run_always(mut self, run_always: bool) -> Self {
        self.run_always = run_always;
        self
    }

    pub fn matrix(mut self, matrix: Matrix) -> Self {
        self.matrix = Some(matrix);
        self
    }

    /// Id used to group expansions: the template id for instances, the
    /// task's own id otherwise.
    pub fn group_id(&self) -> &str {
        self.template.as_deref().unwrap_or(&self.id)
    }
}
