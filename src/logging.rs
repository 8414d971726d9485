// src/logging.rs

//! `tracing` subscriber setup for the binary.
//!
//! The filter comes from, in order:
//! 1. `--log-level` (applies one level to everything),
//! 2. `DAGVISOR_LOG`, which takes either a bare level (`debug`) or full
//!    `EnvFilter` directives (`dagvisor::exec=trace,info`),
//! 3. `info`.
//!
//! Output goes to stderr; stdout carries the run summary and dry-run
//! listing.

use anyhow::{Result, anyhow};
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "DAGVISOR_LOG";

pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let filter = build_filter(cli_level, env_value.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

/// Level used when the whole filter collapses to a single level.
pub fn resolve_level(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Level {
    match cli_level {
        Some(lvl) => lvl.into(),
        None => env_value.and_then(parse_level).unwrap_or(Level::INFO),
    }
}

/// Filter for [`init_logging`]. Unparseable env directives fall back to the
/// default level.
pub fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if cli_level.is_some() {
        return level_filter(resolve_level(cli_level, None));
    }
    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(value) if parse_level(value).is_some() => {
            level_filter(resolve_level(None, Some(value)))
        }
        Some(directives) => {
            EnvFilter::try_new(directives).unwrap_or_else(|_| level_filter(Level::INFO))
        }
        None => level_filter(Level::INFO),
    }
}

fn level_filter(level: Level) -> EnvFilter {
    EnvFilter::new(level.as_str().to_ascii_lowercase())
}

impl From<LogLevel> for Level {
    fn from(lvl: LogLevel) -> Self {
        match lvl {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

fn parse_level(s: &str) -> Option<Level> {
    match s.trim().to_ascii_lowercase().as_str() {
        "error" => Some(Level::ERROR),
        "warn" | "warning" => Some(Level::WARN),
        "info" => Some(Level::INFO),
        "debug" => Some(Level::DEBUG),
        "trace" => Some(Level::TRACE),
        _ => None,
    }
}
