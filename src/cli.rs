// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

use crate::types::Superstep;

/// Command-line arguments for `iterdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "iterdag",
    version,
    about = "Run an iterative job as a cyclic pipeline over a bulk-synchronous dataflow.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the job config file (TOML).
    #[arg(long, value_name = "PATH", default_value = "Iterdag.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `ITERDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the job graph, but don't run the job.
    #[arg(long)]
    pub dry_run: bool,

    /// Override `[job].parallelism`.
    #[arg(long, value_name = "N")]
    pub parallelism: Option<usize>,

    /// Override `[job].max_supersteps`.
    #[arg(long, value_name = "N")]
    pub max_supersteps: Option<Superstep>,
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

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
