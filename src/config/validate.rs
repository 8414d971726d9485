// src/config/validate.rs

use std::time::Duration;

use crate::condition::SkipCondition;
use crate::config::duration::parse_duration;
use crate::config::model::{
    RawDefaults, RawRetry, RawTask, RawWorkflowFile, RawWorkflowSection, WorkflowFile,
    WorkflowSettings,
};
use crate::dag::{Matrix, Task};
use crate::errors::{DagvisorError, Result};
use crate::exec::{BackoffStrategy, ExecutionRequest, RetryPolicy};

const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

impl TryFrom<RawWorkflowFile> for WorkflowFile {
    type Error = DagvisorError;

    fn try_from(raw: RawWorkflowFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        let settings = validate_workflow_section(&raw.workflow)?;

        let mut tasks = Vec::with_capacity(raw.task.len());
        for (id, task) in &raw.task {
            tasks.push(build_task(id, task, &raw.defaults)?);
        }

        Ok(WorkflowFile::new_unchecked(settings, tasks))
    }
}

fn ensure_has_tasks(raw: &RawWorkflowFile) -> Result<()> {
    if raw.task.is_empty() {
        return Err(DagvisorError::ConfigError(
            "workflow must contain at least one [task.<id>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_workflow_section(section: &RawWorkflowSection) -> Result<WorkflowSettings> {
    let defaults = WorkflowSettings::default();

    let max_parallel = section.max_parallel.unwrap_or(defaults.max_parallel);
    if max_parallel == 0 {
        return Err(DagvisorError::ConfigError(
            "[workflow].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }

    let sample_interval = match &section.sample_interval {
        Some(s) => duration_field("[workflow].sample_interval", s)?,
        None => defaults.sample_interval,
    };
    if sample_interval.is_zero() {
        return Err(DagvisorError::ConfigError(
            "[workflow].sample_interval must be positive".to_string(),
        ));
    }

    Ok(WorkflowSettings {
        max_parallel,
        stop_on_failure: section.stop_on_failure.unwrap_or(defaults.stop_on_failure),
        sample_interval,
    })
}

fn build_task(id: &str, raw: &RawTask, defaults: &RawDefaults) -> Result<Task> {
    let field = |name: &str| format!("[task.{id}].{name}");

    let mut request = match (&raw.cmd, &raw.program) {
        (Some(cmd), None) => {
            if !raw.args.is_empty() {
                return Err(DagvisorError::ConfigError(format!(
                    "{} cannot be combined with `cmd`; put arguments in the command string",
                    field("args")
                )));
            }
            ExecutionRequest::shell(cmd.clone())
        }
        (None, Some(program)) => ExecutionRequest::new(program.clone()).args(raw.args.clone()),
        (Some(_), Some(_)) => {
            return Err(DagvisorError::ConfigError(format!(
                "task '{id}' sets both `cmd` and `program`; use exactly one"
            )));
        }
        (None, None) => {
            return Err(DagvisorError::ConfigError(format!(
                "task '{id}' needs either `cmd` or `program`"
            )));
        }
    };

    if let Some(cwd) = raw.cwd.as_ref().or(defaults.cwd.as_ref()) {
        request = request.working_dir(cwd);
    }

    for (key, value) in defaults.env.iter().chain(raw.env.iter()) {
        request = request.env(key.clone(), value.clone());
    }

    if let Some(timeout) = raw.timeout.as_ref().or(defaults.timeout.as_ref()) {
        let timeout = duration_field(&field("timeout"), timeout)?;
        if timeout.is_zero() {
            return Err(DagvisorError::ConfigError(format!(
                "{} must be positive",
                field("timeout")
            )));
        }
        request = request.timeout(timeout);
    }

    if let Some(retry) = raw.retry.as_ref().or(defaults.retry.as_ref()) {
        request = request.retry(retry_policy(&field("retry"), retry)?);
    }

    let mut task = Task::new(id, request)
        .depends_on(raw.depends_on.iter().cloned())
        .run_always(raw.run_always);

    if let Some(expr) = &raw.skip_if {
        task = task.skip_if(SkipCondition::parse(expr)?);
    }

    if let Some(axes) = &raw.matrix {
        let matrix = axes.iter().fold(Matrix::new(), |m, (name, values)| {
            m.axis(name.clone(), values.iter().map(ToString::to_string))
        });
        task = task.matrix(matrix);
    }

    Ok(task)
}

fn retry_policy(field: &str, raw: &RawRetry) -> Result<RetryPolicy> {
    let strategy: BackoffStrategy = raw
        .strategy
        .parse()
        .map_err(|e: String| DagvisorError::InvalidRetryPolicy(format!("{field}: {e}")))?;

    let base_delay = match &raw.base_delay {
        Some(s) => duration_field(&format!("{field}.base_delay"), s)?,
        None => DEFAULT_RETRY_BASE_DELAY,
    };
    let max_delay = raw
        .max_delay
        .as_ref()
        .map(|s| duration_field(&format!("{field}.max_delay"), s))
        .transpose()?;

    RetryPolicy::new(
        strategy,
        raw.max_attempts.unwrap_or(DEFAULT_RETRY_ATTEMPTS),
        base_delay,
        max_delay,
    )
    .map_err(|e| match e {
        DagvisorError::InvalidRetryPolicy(msg) => {
            DagvisorError::InvalidRetryPolicy(format!("{field}: {msg}"))
        }
        other => other,
    })
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| DagvisorError::ConfigError(format!("{field}: {e}")))
}
