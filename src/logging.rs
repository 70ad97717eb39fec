// src/logging.rs

//! Logging setup for `iterdag` using `tracing` + `tracing-subscriber`.
//!
//! Filter selection, first match wins:
//! 1. `--log-level` CLI flag, applied to every target
//! 2. `ITERDAG_LOG`, in `EnvFilter` syntax (`debug`, `iterdag::sync=trace,info`)
//! 3. `info`
//!
//! Logs go to STDERR; stdout carries the job summary only.

use anyhow::Result;
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "ITERDAG_LOG";

/// Initialise the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let (filter, rejected) = log_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    if let Some(value) = rejected {
        warn!(value = %value, "ignoring unparsable {LOG_ENV}; logging at info");
    }
    Ok(())
}

/// Resolve the filter. The second value is an `ITERDAG_LOG` setting that was
/// present but could not be parsed.
pub fn log_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> (EnvFilter, Option<String>) {
    if let Some(level) = cli_level {
        return (EnvFilter::new(level_directive(level)), None);
    }
    match env.map(str::trim).filter(|s| !s.is_empty()) {
        Some(directives) => match EnvFilter::try_new(directives) {
            Ok(filter) => (filter, None),
            Err(_) => (EnvFilter::new("info"), Some(directives.to_string())),
        },
        None => (EnvFilter::new("info"), None),
    }
}

fn level_directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}
