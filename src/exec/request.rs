// src/exec/request.rs

//! What to run: the immutable description of one supervised execution.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::exec::backoff::RetryPolicy;

/// A command to launch, plus its environment, timeout and retry policy.
///
/// Built once (usually via the builder-style methods) and then only read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRequest {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Environment overrides layered on top of the inherited environment.
    pub env: BTreeMap<String, String>,
    pub timeout: Option<Duration>,
    pub retry: Option<RetryPolicy>,
    /// Set by [`shell`](Self::shell). The shell's "not found" and "not
    /// executable" exit codes then count as launch errors.
    pub shell: bool,
}

impl ExecutionRequest {
    /// Direct form: launch `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            timeout: None,
            retry: None,
            shell: false,
        }
    }

    /// Shell form: run `cmd` through the platform shell.
    pub fn shell(cmd: impl Into<String>) -> Self {
        let cmd = cmd.into();
        let request = if cfg!(windows) {
            Self::new("cmd").arg("/C").arg(cmd)
        } else {
            Self::new("sh").arg("-c").arg(cmd)
        };
        Self {
            shell: true,
            ..request
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    /// Retry policy in effect (single attempt when none was given).
    pub fn effective_retry(&self) -> RetryPolicy {
        self.retry.unwrap_or_default()
    }

    /// Human-readable command line, for logs and dry-run output.
    pub fn display_command(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            if arg.contains(char::is_whitespace) {
                out.push('\'');
                out.push_str(arg);
                out.push('\'');
            } else {
                out.push_str(arg);
            }
        }
        out
    }

    /// Apply `f` to every user-supplied string (program, args, env values,
    /// working dir). Used for matrix substitution.
    pub(crate) fn map_strings(&self, f: impl Fn(&str) -> String) -> Self {
        Self {
            program: f(&self.program),
            args: self.args.iter().map(|a| f(a)).collect(),
            working_dir: self
                .working_dir
                .as_ref()
                .map(|d| PathBuf::from(f(&d.to_string_lossy()))),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), f(v)))
                .collect(),
            timeout: self.timeout,
            retry: self.retry,
            shell: self.shell,
        }
    }
}
