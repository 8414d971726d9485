// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet};

use petgraph::Direction;
use petgraph::graphmap::DiGraphMap;
use tracing::{debug, warn};

use crate::dag::matrix;
use crate::dag::task::{Task, TaskId};
use crate::errors::{DagvisorError, Result};

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone, Default)]
struct DagNode {
    deps: Vec<TaskId>,
    dependents: Vec<TaskId>,
}

/// Validated, matrix-expanded task graph.
///
/// Only [`TaskGraph::build`] constructs one, so every instance is acyclic
/// and every dependency resolves. It is read-only afterwards.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    /// Concrete tasks in submission order; `depends_on` is fully resolved.
    tasks: Vec<Task>,
    index: HashMap<TaskId, usize>,
    nodes: HashMap<TaskId, DagNode>,
    levels: Vec<Vec<TaskId>>,
}

impl TaskGraph {
    /// Expand, resolve and validate `tasks`.
    ///
    /// Fails on duplicate ids, malformed matrices, unknown dependencies,
    /// skip conditions naming unknown tasks, and cycles. Nothing partial is
    /// returned.
    pub fn build(tasks: Vec<Task>) -> Result<Self> {
        ensure_unique(tasks.iter().map(|t| t.id.as_str()))?;

        let mut expanded: Vec<Task> = Vec::new();
        let mut groups: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
        for task in &tasks {
            let instances = matrix::expand(task)?;
            if task.matrix.is_some() {
                debug!(task = %task.id, instances = instances.len(), "expanded matrix task");
                groups.insert(
                    task.id.clone(),
                    instances.iter().map(|t| t.id.clone()).collect(),
                );
            }
            expanded.extend(instances);
        }
        ensure_unique(expanded.iter().map(|t| t.id.as_str()))?;

        let index: HashMap<TaskId, usize> = expanded
            .iter()
            .enumerate()
            .map(|(i, t)| (t.id.clone(), i))
            .collect();

        for task in expanded.iter_mut() {
            task.depends_on = resolve_dependencies(task, &index, &groups)?;
        }

        for task in &expanded {
            if let Some(cond) = &task.skip_if {
                for referenced in cond.expr.referenced_tasks() {
                    if !index.contains_key(referenced) {
                        return Err(DagvisorError::InvalidCondition {
                            expression: cond.source.clone(),
                            reason: format!(
                                "task '{}' references unknown task '{referenced}'",
                                task.id
                            ),
                        });
                    }
                }
            }
        }

        let mut nodes: HashMap<TaskId, DagNode> = expanded
            .iter()
            .map(|t| {
                (
                    t.id.clone(),
                    DagNode {
                        deps: t.depends_on.clone(),
                        dependents: Vec::new(),
                    },
                )
            })
            .collect();
        for task in &expanded {
            for dep in &task.depends_on {
                if let Some(node) = nodes.get_mut(dep) {
                    node.dependents.push(task.id.clone());
                }
            }
        }

        detect_cycle(&expanded)?;
        let levels = compute_levels(&expanded, &nodes);

        let graph = Self {
            tasks: expanded,
            index,
            nodes,
            levels,
        };
        graph.warn_on_unordered_conditions();

        debug!(
            tasks = graph.len(),
            levels = graph.levels.len(),
            max_parallelism = graph.max_parallelism(),
            "task graph built"
        );
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Concrete tasks in submission order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Immediate dependencies of a task.
    pub fn dependencies_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a task.
    pub fn dependents_of(&self, id: &str) -> &[TaskId] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Kahn levels: level 0 has no dependencies, level N+1 depends only on
    /// levels <= N. Ids are sorted within a level.
    pub fn levels(&self) -> &[Vec<TaskId>] {
        &self.levels
    }

    /// Every task, dependencies before dependents.
    pub fn topological_order(&self) -> Vec<&str> {
        self.levels
            .iter()
            .flat_map(|level| level.iter().map(String::as_str))
            .collect()
    }

    /// Width of the widest level: the most tasks that could ever run at
    /// once.
    pub fn max_parallelism(&self) -> usize {
        self.levels.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// All transitive dependencies of `id`.
    pub fn ancestors_of(&self, id: &str) -> HashSet<&str> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = self.dependencies_of(id).iter().map(String::as_str).collect();
        while let Some(current) = stack.pop() {
            if seen.insert(current) {
                stack.extend(self.dependencies_of(current).iter().map(String::as_str));
            }
        }
        seen
    }

    /// A condition reading a task that is not upstream may see it before it
    /// has finished.
    fn warn_on_unordered_conditions(&self) {
        for task in &self.tasks {
            let Some(cond) = &task.skip_if else { continue };
            let ancestors = self.ancestors_of(&task.id);
            for referenced in cond.expr.referenced_tasks() {
                if !ancestors.contains(referenced) {
                    warn!(
                        task = %task.id,
                        referenced,
                        "skip_if reads a task that is not a dependency; its result may not be ready"
                    );
                }
            }
        }
    }
}

fn ensure_unique<'a>(ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(DagvisorError::DuplicateTask(id.to_string()));
        }
    }
    Ok(())
}

/// Map each `depends_on` entry to concrete ids; a matrix template name fans
/// out to all its instances.
fn resolve_dependencies(
    task: &Task,
    index: &HashMap<TaskId, usize>,
    groups: &HashMap<TaskId, Vec<TaskId>>,
) -> Result<Vec<TaskId>> {
    let mut resolved: Vec<TaskId> = Vec::new();
    for dep in &task.depends_on {
        let targets: Vec<TaskId> = if index.contains_key(dep) {
            vec![dep.clone()]
        } else if let Some(instances) = groups.get(dep) {
            instances.clone()
        } else {
            return Err(DagvisorError::DanglingDependency {
                task: task.id.clone(),
                dependency: dep.clone(),
            });
        };
        for target in targets {
            if !resolved.contains(&target) {
                resolved.push(target);
            }
        }
    }
    Ok(resolved)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Visited,
}

/// Depth-first search with visiting/visited marks. A back edge to a node
/// still on the stack is a cycle; its members are the stack from that node
/// down, closed with the node again.
fn detect_cycle(tasks: &[Task]) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for task in tasks {
        graph.add_node(task.id.as_str());
    }
    for task in tasks {
        for dep in &task.depends_on {
            graph.add_edge(dep.as_str(), task.id.as_str(), ());
        }
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for task in tasks {
        let start = task.id.as_str();
        if marks.contains_key(start) {
            continue;
        }

        // Explicit stack of (node, remaining successors).
        let mut stack: Vec<(&str, Vec<&str>)> = Vec::new();
        marks.insert(start, Mark::Visiting);
        stack.push((start, successors(&graph, start)));

        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(next) => match marks.get(next) {
                    Some(Mark::Visiting) => {
                        let from = stack.iter().position(|(n, _)| *n == next).unwrap_or(0);
                        let mut members: Vec<String> =
                            stack[from..].iter().map(|(n, _)| n.to_string()).collect();
                        members.push(next.to_string());
                        return Err(DagvisorError::CycleDetected { members });
                    }
                    Some(Mark::Visited) => {}
                    None => {
                        marks.insert(next, Mark::Visiting);
                        stack.push((next, successors(&graph, next)));
                    }
                },
                None => {
                    marks.insert(node, Mark::Visited);
                    stack.pop();
                }
            }
        }
    }

    Ok(())
}

fn successors<'a>(graph: &DiGraphMap<&'a str, ()>, node: &'a str) -> Vec<&'a str> {
    let mut next: Vec<&str> = graph.neighbors_directed(node, Direction::Outgoing).collect();
    // Reverse-sorted so `pop` visits in sorted order.
    next.sort_unstable_by(|a, b| b.cmp(a));
    next
}

/// Iterative Kahn peeling over an already acyclic graph.
fn compute_levels(tasks: &[Task], nodes: &HashMap<TaskId, DagNode>) -> Vec<Vec<TaskId>> {
    let mut remaining: HashMap<&str, usize> = tasks
        .iter()
        .map(|t| (t.id.as_str(), t.depends_on.len()))
        .collect();

    let mut current: BTreeSet<&str> = remaining
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut levels = Vec::new();
    while !current.is_empty() {
        let mut next: BTreeSet<&str> = BTreeSet::new();
        for &id in &current {
            remaining.remove(id);
            let dependents = nodes.get(id).map(|n| n.dependents.as_slice()).unwrap_or(&[]);
            for dependent in dependents {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        next.insert(dependent.as_str());
                    }
                }
            }
        }
        levels.push(current.iter().map(|s| s.to_string()).collect());
        current = next;
    }

    levels
}
