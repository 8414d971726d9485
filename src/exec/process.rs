// src/exec/process.rs

//! One supervised process launch: spawn, sample, wait with timeout, and
//! kill the whole process tree when the timeout fires.

use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::exec::request::ExecutionRequest;
use crate::exec::result::AttemptOutcome;
use crate::sampler::{self, MetricsSummary};

/// How long to wait for stdout/stderr readers after the process is gone.
/// Background grandchildren can otherwise hold the pipes open.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Shell exit codes for "command not found" and "found but not executable".
#[cfg(unix)]
const SHELL_LAUNCH_FAILURE_CODES: &[i32] = &[126, 127];
#[cfg(windows)]
const SHELL_LAUNCH_FAILURE_CODES: &[i32] = &[9009];

/// Launch `request` once and supervise it to completion.
///
/// `on_spawn` runs once the process exists. Never fails: launch problems
/// come back as [`AttemptOutcome::LaunchFailed`].
pub async fn run_attempt(
    label: &str,
    attempt: u32,
    request: &ExecutionRequest,
    sample_interval: Duration,
    on_spawn: impl FnOnce(),
) -> (AttemptOutcome, MetricsSummary) {
    let started = Instant::now();
    let mut cmd = build_command(request);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(
                task = %label,
                attempt,
                program = %request.program,
                error = %err,
                "failed to launch process"
            );
            let outcome = AttemptOutcome::LaunchFailed {
                message: format!("{}: {err}", request.program),
            };
            let mut metrics = MetricsSummary::unsampled();
            metrics.wall_time = started.elapsed();
            return (outcome, metrics);
        }
    };

    let Some(pid) = child.id() else {
        // Already reaped; cannot happen right after spawn, but handle it.
        let outcome = match child.wait().await {
            Ok(status) => AttemptOutcome::Exited {
                code: status.code(),
                success: status.success(),
            },
            Err(err) => AttemptOutcome::LaunchFailed {
                message: err.to_string(),
            },
        };
        let mut metrics = MetricsSummary::unsampled();
        metrics.wall_time = started.elapsed();
        return (outcome, metrics);
    };

    info!(
        task = %label,
        attempt,
        pid,
        cmd = %request.display_command(),
        "process started"
    );
    on_spawn();

    let stdout_lines = child
        .stdout
        .take()
        .map(|out| spawn_line_counter(label.to_string(), "stdout", out));
    let stderr_lines = child
        .stderr
        .take()
        .map(|err| spawn_line_counter(label.to_string(), "stderr", err));

    let mut sampler = sampler::start(pid, sample_interval);
    let deadline = request.timeout.map(|t| started + t);
    let mut sampler_live = true;

    let waited = loop {
        tokio::select! {
            status = child.wait() => break Some(status),
            _ = wait_until(deadline) => break None,
            more = sampler.absorb(), if sampler_live => {
                if !more {
                    sampler_live = false;
                }
            }
        }
    };

    let exit_code = match &waited {
        Some(Ok(status)) => status.code(),
        _ => None,
    };
    let outcome = match waited {
        Some(Ok(status)) => classify_exit(label, request, status.code(), status.success()),
        Some(Err(err)) => {
            warn!(task = %label, attempt, pid, error = %err, "failed waiting on process");
            AttemptOutcome::Exited {
                code: None,
                success: false,
            }
        }
        None => {
            warn!(
                task = %label,
                attempt,
                pid,
                timeout = ?request.timeout,
                "timeout exceeded; killing process tree"
            );
            kill_process_tree(&mut child, pid).await;
            AttemptOutcome::TimedOut
        }
    };

    let mut metrics = sampler.stop().await;
    metrics.wall_time = started.elapsed();

    let drain_deadline = Instant::now() + OUTPUT_DRAIN_GRACE;
    let (out, err) = tokio::join!(
        finish_counter(stdout_lines, drain_deadline),
        finish_counter(stderr_lines, drain_deadline),
    );
    metrics.stdout_lines = out;
    metrics.stderr_lines = err;

    match &outcome {
        AttemptOutcome::Exited { code, success } => {
            metrics.exit_code = *code;
            metrics.success = *success;
        }
        AttemptOutcome::LaunchFailed { .. } => {
            metrics.exit_code = exit_code;
        }
        AttemptOutcome::TimedOut => {}
    }

    info!(
        task = %label,
        attempt,
        pid,
        exit_code = ?metrics.exit_code,
        success = metrics.success,
        elapsed_ms = metrics.wall_time.as_millis() as u64,
        "process finished"
    );

    (outcome, metrics)
}

/// Exit of a shell-form request with a shell launch-failure code means the
/// command itself never started.
fn classify_exit(
    label: &str,
    request: &ExecutionRequest,
    code: Option<i32>,
    success: bool,
) -> AttemptOutcome {
    match code {
        Some(code) if request.shell && SHELL_LAUNCH_FAILURE_CODES.contains(&code) => {
            warn!(task = %label, exit_code = code, "shell could not launch command");
            AttemptOutcome::LaunchFailed {
                message: format!(
                    "{}: shell exited with {code} (command not found or not executable)",
                    request.display_command()
                ),
            }
        }
        _ => AttemptOutcome::Exited { code, success },
    }
}

fn build_command(request: &ExecutionRequest) -> Command {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .envs(&request.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = &request.working_dir {
        cmd.current_dir(dir);
    }

    // Own process group so a timeout can signal every descendant at once.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending::<()>().await,
    }
}

/// Background reader counting the lines of one output stream.
///
/// The count lives outside the task so lines read before an abort are kept.
struct LineCounter {
    count: Arc<AtomicU64>,
    handle: JoinHandle<()>,
}

fn spawn_line_counter<R>(label: String, stream: &'static str, reader: R) -> LineCounter
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let count = Arc::new(AtomicU64::new(0));
    let seen = Arc::clone(&count);
    let handle = tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            seen.fetch_add(1, Ordering::Relaxed);
            debug!(task = %label, stream, "{}", line);
        }
    });
    LineCounter { count, handle }
}

/// Wait for the reader to hit EOF, or give up at `deadline`.
async fn finish_counter(counter: Option<LineCounter>, deadline: Instant) -> u64 {
    let Some(LineCounter { count, mut handle }) = counter else {
        return 0;
    };
    if tokio::time::timeout_at(deadline.into(), &mut handle)
        .await
        .is_err()
    {
        debug!("output still open after the process exited; abandoning reader");
        handle.abort();
    }
    count.load(Ordering::Relaxed)
}

/// Kill `child` and every process descended from it, then reap `child`.
///
/// Descendants are discovered before anything is signalled, since orphans
/// get re-parented once their parent dies.
pub async fn kill_process_tree(child: &mut Child, pid: u32) {
    let descendants = descendants_of(pid);
    debug!(pid, ?descendants, "killing process tree");

    #[cfg(unix)]
    signal_process_group(pid);

    for descendant in descendants.iter().rev() {
        kill_pid(*descendant);
    }

    if let Err(err) = child.kill().await {
        debug!(pid, error = %err, "child already exited while killing");
    }
}

/// SIGKILL the process group led by `pgid` (the child was spawned as a
/// group leader).
#[cfg(unix)]
fn signal_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; a stale pgid only
    // yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(pgid, "killpg failed (group already gone?)");
    }
}

/// All live descendants of `root`, parents before children.
pub fn descendants_of(root: u32) -> Vec<u32> {
    let mut system = System::new();
    system.refresh_processes();

    let root = Pid::from_u32(root);
    let mut found: Vec<Pid> = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for (pid, process) in system.processes() {
            if process.parent() == Some(parent) && *pid != root && !found.contains(pid) {
                found.push(*pid);
                frontier.push(*pid);
            }
        }
    }

    found.into_iter().map(|pid| pid.as_u32()).collect()
}

/// Forcefully kill one pid. Returns `false` if it was already gone.
pub fn kill_pid(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    if !system.refresh_process(pid) {
        return false;
    }
    system.process(pid).is_some_and(|process| process.kill())
}

/// Whether `pid` currently names a live (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    let mut system = System::new();
    let pid = Pid::from_u32(pid);
    if !system.refresh_process(pid) {
        return false;
    }
    system.process(pid).is_some_and(|process| {
        !matches!(
            process.status(),
            sysinfo::ProcessStatus::Zombie | sysinfo::ProcessStatus::Dead
        )
    })
}
