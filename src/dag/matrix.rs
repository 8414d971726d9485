// src/dag/matrix.rs

//! Matrix expansion.
//!
//! A matrix maps variable names to value lists. A task carrying one expands
//! into the cartesian product of those lists, one concrete task per
//! combination, with id `name[var1=val1,var2=val2]` (variables in sorted
//! order). `${matrix.<var>}` placeholders in the command, arguments,
//! environment values, working directory and `depends_on` entries are
//! replaced by the instance's values.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;
use serde::Serialize;

use crate::dag::task::Task;
use crate::errors::{DagvisorError, Result};

const PLACEHOLDER: &str = r"\$\{matrix\.([^}]*)\}";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Matrix {
    axes: BTreeMap<String, Vec<String>>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes
            .insert(name.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn axes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.axes
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Number of combinations (product of axis lengths).
    pub fn len(&self) -> usize {
        if self.axes.is_empty() {
            return 0;
        }
        self.axes.values().map(Vec::len).product()
    }

    /// Every combination, in lexicographic order of axis then value
    /// position.
    pub fn combinations(&self) -> Vec<BTreeMap<String, String>> {
        let mut out: Vec<BTreeMap<String, String>> = vec![BTreeMap::new()];
        for (name, values) in &self.axes {
            let mut next = Vec::with_capacity(out.len() * values.len());
            for partial in &out {
                for value in values {
                    let mut combo = partial.clone();
                    combo.insert(name.clone(), value.clone());
                    next.push(combo);
                }
            }
            out = next;
        }
        if self.axes.is_empty() {
            out.clear();
        }
        out
    }

    fn validate(&self, task: &str) -> Result<()> {
        let err = |reason: String| DagvisorError::MatrixExpansion {
            task: task.to_string(),
            reason,
        };

        if self.axes.is_empty() {
            return Err(err("matrix has no variables".into()));
        }

        for (name, values) in &self.axes {
            if !is_valid_var_name(name) {
                return Err(err(format!(
                    "invalid variable name '{name}' (use letters, digits, '_' or '-')"
                )));
            }
            if values.is_empty() {
                return Err(err(format!("variable '{name}' has no values")));
            }
            let mut seen = HashSet::new();
            for value in values {
                if value.contains([']', ',', '[']) {
                    return Err(err(format!(
                        "value '{value}' of '{name}' may not contain '[', ']' or ','"
                    )));
                }
                if !seen.insert(value.as_str()) {
                    return Err(err(format!("variable '{name}' lists '{value}' twice")));
                }
            }
        }
        Ok(())
    }
}

fn is_valid_var_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Id of the instance of `base` for `values`.
pub fn instance_id(base: &str, values: &BTreeMap<String, String>) -> String {
    let pairs: Vec<String> = values.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{base}[{}]", pairs.join(","))
}

/// Expand `task` into its concrete instances. A task without a matrix
/// comes back unchanged as a single instance.
pub fn expand(task: &Task) -> Result<Vec<Task>> {
    let Some(matrix) = &task.matrix else {
        return Ok(vec![task.clone()]);
    };
    matrix.validate(&task.id)?;

    let placeholder = Regex::new(PLACEHOLDER).map_err(|e| DagvisorError::MatrixExpansion {
        task: task.id.clone(),
        reason: e.to_string(),
    })?;
    check_placeholders(task, matrix, &placeholder)?;

    let instances = matrix
        .combinations()
        .into_iter()
        .map(|values| {
            let subst = |s: &str| substitute(&placeholder, s, &values);
            Task {
                id: instance_id(&task.id, &values),
                request: task.request.map_strings(subst),
                depends_on: task.depends_on.iter().map(|d| subst(d)).collect(),
                skip_if: task.skip_if.clone(),
                run_always: task.run_always,
                matrix: None,
                template: Some(task.id.clone()),
                matrix_values: values,
            }
        })
        .collect();

    Ok(instances)
}

fn substitute(placeholder: &Regex, input: &str, values: &BTreeMap<String, String>) -> String {
    placeholder
        .replace_all(input, |caps: &regex::Captures<'_>| {
            values.get(&caps[1]).cloned().unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Reject placeholders naming variables the matrix does not define.
fn check_placeholders(task: &Task, matrix: &Matrix, placeholder: &Regex) -> Result<()> {
    let req = &task.request;
    let dir = req
        .working_dir
        .as_ref()
        .map(|d| d.to_string_lossy().into_owned());

    let texts = std::iter::once(req.program.as_str())
        .chain(req.args.iter().map(String::as_str))
        .chain(req.env.values().map(String::as_str))
        .chain(dir.as_deref())
        .chain(task.depends_on.iter().map(String::as_str));

    for text in texts {
        for caps in placeholder.captures_iter(text) {
            let var = &caps[1];
            if !matrix.axes.contains_key(var) {
                return Err(DagvisorError::MatrixExpansion {
                    task: task.id.clone(),
                    reason: format!("placeholder '${{matrix.{var}}}' names an unknown variable"),
                });
            }
        }
    }
    Ok(())
}
