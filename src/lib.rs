// src/lib.rs

pub mod cli;
pub mod condition;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod sampler;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::WorkflowFile;
use crate::config::loader::load_and_validate;
use crate::dag::{TaskGraph, TaskState};
use crate::engine::{TracingProgress, TracingSink, WorkflowOrchestrator, WorkflowResult};
use crate::exec::ExecutionEngine;

/// What [`run`] did.
#[derive(Debug)]
pub enum RunOutcome {
    /// `--dry-run`: validated and printed, nothing executed.
    DryRun,
    Finished(WorkflowResult),
}

impl RunOutcome {
    /// Whether the process should exit with status 0.
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::DryRun => true,
            RunOutcome::Finished(result) => result.is_success(),
        }
    }
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - workflow loading and graph validation
/// - the process execution engine
/// - the orchestrator, with tracing-based progress and result sinks
pub async fn run(args: CliArgs) -> Result<RunOutcome> {
    let workflow_path = PathBuf::from(&args.workflow);
    let workflow = load_and_validate(&workflow_path)
        .with_context(|| format!("loading workflow {}", workflow_path.display()))?;
    let graph = workflow
        .build_graph()
        .context("validating task graph")?;

    let max_parallel = args
        .max_parallel
        .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
        .unwrap_or(workflow.settings.max_parallel);
    let stop_on_failure = args.stop_on_failure || workflow.settings.stop_on_failure;

    if args.dry_run {
        print_dry_run(&workflow, &graph, max_parallel, stop_on_failure);
        return Ok(RunOutcome::DryRun);
    }

    let engine = ExecutionEngine::new(workflow.engine_options());
    let orchestrator = WorkflowOrchestrator::new(engine)
        .with_listener(Arc::new(TracingProgress))
        .with_sink(Arc::new(TracingSink));

    info!(
        workflow = %workflow_path.display(),
        tasks = graph.len(),
        max_parallel,
        stop_on_failure,
        "running workflow"
    );
    let result = orchestrator.run(&graph, max_parallel, stop_on_failure).await;
    print_summary(&graph, &result);

    Ok(RunOutcome::Finished(result))
}

/// Print settings, levels and every expanded task.
fn print_dry_run(
    workflow: &WorkflowFile,
    graph: &TaskGraph,
    max_parallel: usize,
    stop_on_failure: bool,
) {
    println!("dagvisor dry-run");
    println!("  workflow.max_parallel = {max_parallel}");
    println!("  workflow.stop_on_failure = {stop_on_failure}");
    println!(
        "  workflow.sample_interval = {:?}",
        workflow.settings.sample_interval
    );
    println!("  max theoretical parallelism = {}", graph.max_parallelism());
    println!();

    println!("levels ({}):", graph.levels().len());
    for (i, level) in graph.levels().iter().enumerate() {
        println!("  {i}: {}", level.join(", "));
    }
    println!();

    println!("tasks ({}):", graph.len());
    for id in graph.topological_order() {
        let Some(task) = graph.get(id) else { continue };
        println!("  - {id}");
        println!("      cmd: {}", task.request.display_command());
        if let Some(dir) = &task.request.working_dir {
            println!("      cwd: {}", dir.display());
        }
        if !task.depends_on.is_empty() {
            println!("      depends_on: {:?}", task.depends_on);
        }
        if let Some(timeout) = task.request.timeout {
            println!("      timeout: {timeout:?}");
        }
        if let Some(retry) = &task.request.retry {
            println!(
                "      retry: {} x{} (base {:?}, max {:?})",
                retry.strategy(),
                retry.max_attempts(),
                retry.base_delay(),
                retry.max_delay()
            );
        }
        if let Some(cond) = &task.skip_if {
            println!("      skip_if: {}", cond.source);
        }
        if task.run_always {
            println!("      run_always: true");
        }
    }

    debug!("dry-run complete (no execution)");
}

/// One line per task, in graph order, then totals.
fn print_summary(graph: &TaskGraph, result: &WorkflowResult) {
    println!();
    println!(
        "{:<32} {:<10} {:>8} {:>10} {:>12} {:>6}",
        "task", "state", "attempts", "time", "peak mem", "exit"
    );
    for id in graph.topological_order() {
        let Some(task) = result.task(id) else { continue };
        let (attempts, time, memory, exit) = match &task.execution {
            Some(exec) => (
                exec.attempt_count().to_string(),
                format!("{:.2}s", exec.total_elapsed.as_secs_f64()),
                format_bytes(exec.peak_memory_bytes()),
                exec.exit_code().map_or("-".to_string(), |c| c.to_string()),
            ),
            None => ("-".into(), "-".into(), "-".into(), "-".into()),
        };
        println!(
            "{:<32} {:<10} {:>8} {:>10} {:>12} {:>6}",
            id, task.state, attempts, time, memory, exit
        );
        if task.state == TaskState::Skipped {
            if let Some(reason) = &task.skip_reason {
                println!("    skipped: {reason}");
            }
        }
    }
    println!();
    println!(
        "workflow {}: {} succeeded, {} failed, {} skipped in {:.2}s",
        result.status,
        result.succeeded,
        result.failed,
        result.skipped,
        result.total_wall_time.as_secs_f64()
    );
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
