// src/lib.rs

pub mod channel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod io;
pub mod iteration;
pub mod logging;
pub mod pagerank;
pub mod record;
pub mod sort;
pub mod stage;
pub mod sync;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_from_path, JobConfig, RawJobConfig};
use crate::engine::JobGraph;
use crate::io::{TextDirSink, TextFileSource};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the config (with CLI overrides applied), then either
/// prints the job graph (`--dry-run`) or runs PageRank over the `[io]` files.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let mut raw = load_from_path(&config_path)?;
    apply_overrides(&mut raw, &args);
    let cfg = JobConfig::try_from(raw)?;

    if args.dry_run {
        let graph = JobGraph::for_job(&cfg, false)?;
        print_dry_run(&cfg, &graph);
        return Ok(());
    }

    let root = config_root_dir(&config_path);
    let seed = required_path(&root, cfg.io.seed.as_deref(), "seed")?;
    let companion = required_path(&root, cfg.io.companion.as_deref(), "companion")?;
    let output = required_path(&root, cfg.io.output.as_deref(), "output")?;
    info!(
        seed = %seed.display(),
        companion = %companion.display(),
        output = %output.display(),
        "resolved job inputs"
    );

    let job = pagerank::pagerank_job(
        cfg,
        Arc::new(TextFileSource::new(seed)),
        Arc::new(TextFileSource::new(companion)),
        Arc::new(TextDirSink::new(output)),
    );
    let report = job.run().await?;

    println!("{report}");
    for (superstep, statistic) in report.statistics.iter().enumerate() {
        println!("  superstep {superstep}: delta {statistic:e}");
    }
    Ok(())
}

fn apply_overrides(raw: &mut RawJobConfig, args: &CliArgs) {
    if let Some(parallelism) = args.parallelism {
        debug!(parallelism, "overriding [job].parallelism from CLI");
        raw.job.parallelism = parallelism;
    }
    if let Some(max) = args.max_supersteps {
        debug!(max_supersteps = max, "overriding [job].max_supersteps from CLI");
        raw.job.max_supersteps = max;
    }
}

/// Directory that relative `[io]` paths are resolved against.
///
/// - If the config path has a non-empty parent, that directory.
/// - Otherwise the current working directory.
fn config_root_dir(config_path: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

fn required_path(root: &Path, path: Option<&Path>, key: &str) -> Result<PathBuf> {
    let path = path.ok_or_else(|| anyhow!("[io].{key} is required to run the job"))?;
    Ok(root.join(path))
}

/// Dry-run output: job parameters, then roles and edges in topological order.
fn print_dry_run(cfg: &JobConfig, graph: &JobGraph) {
    println!("iterdag dry-run: {}", cfg.job.name);
    println!("  job.parallelism = {}", cfg.job.parallelism);
    println!("  job.memory_per_partition_mb = {}", cfg.job.memory_per_partition_mb);
    if let Some(bytes) = cfg.job.memory_per_partition_bytes {
        println!("  job.memory_per_partition_bytes = {bytes}");
    }
    println!("  job.max_supersteps = {}", cfg.job.max_supersteps);
    println!("  job.max_file_handles = {}", cfg.job.max_file_handles);
    println!("  job.channel_capacity = {}", cfg.job.channel_capacity);
    println!(
        "  convergence = {:?} (epsilon {:e})",
        cfg.convergence.criterion, cfg.convergence.epsilon
    );
    println!();

    let roles: Vec<&str> = graph.roles().iter().map(|r| r.as_str()).collect();
    println!("roles: {}", roles.join(" -> "));

    let edges = graph.edges();
    println!("edges ({}):", edges.len());
    for edge in edges {
        println!(
            "  - {}: {} -> {} [{}, key field {}, expects {} sender(s)]",
            edge.spec.name,
            edge.from,
            edge.to,
            edge.spec.strategy,
            edge.spec.key_field,
            edge.spec.expected_senders()
        );
    }
    println!("  - backchannel: tail -> head [slot per partition]");

    debug!("dry-run complete (no execution)");
}
