// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `dagvisor`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagvisor",
    version,
    about = "Run a dependency graph of supervised commands with retries, timeouts and resource sampling.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Dagvisor.toml")]
    pub workflow: String,

    /// Maximum number of tasks running at once (overrides the workflow file).
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_parallel: Option<u64>,

    /// Skip every task not yet started as soon as one fails.
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DAGVISOR_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the expanded graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
