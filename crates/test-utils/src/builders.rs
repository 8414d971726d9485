use dagvisor::dag::{Matrix, Task, TaskGraph};
use dagvisor::exec::ExecutionRequest;

/// Builder for `Task` to simplify test setup.
///
/// The command defaults to `true`; tests using a `FakeExecutor` never run it.
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            task: Task::new(id, ExecutionRequest::shell("true")),
        }
    }

    pub fn cmd(mut self, cmd: &str) -> Self {
        self.task.request = ExecutionRequest::shell(cmd);
        self
    }

    pub fn request(mut self, request: ExecutionRequest) -> Self {
        self.task.request = request;
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.depends_on.push(dep.to_string());
        self
    }

    pub fn skip_if(mut self, expression: &str) -> Self {
        self.task = self
            .task
            .skip_if_expr(expression)
            .expect("valid skip_if expression");
        self
    }

    pub fn run_always(mut self) -> Self {
        self.task.run_always = true;
        self
    }

    pub fn matrix(mut self, var: &str, values: &[&str]) -> Self {
        let matrix = self.task.matrix.take().unwrap_or_else(Matrix::new);
        self.task.matrix = Some(matrix.axis(var, values.iter().copied()));
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

/// Build a graph that is expected to be valid.
pub fn build_graph(tasks: Vec<Task>) -> TaskGraph {
    TaskGraph::build(tasks).expect("Failed to build valid task graph")
}

/// `A -> B -> D`, `A -> C -> D`.
pub fn diamond() -> TaskGraph {
    build_graph(vec![
        TaskBuilder::new("A").build(),
        TaskBuilder::new("B").after("A").build(),
        TaskBuilder::new("C").after("A").build(),
        TaskBuilder::new("D").after("B").after("C").build(),
    ])
}

/// `n` tasks with no dependencies, named `t0..tn`.
pub fn independent(n: usize) -> TaskGraph {
    build_graph(
        (0..n)
            .map(|i| TaskBuilder::new(&format!("t{i}")).build())
            .collect(),
    )
}
