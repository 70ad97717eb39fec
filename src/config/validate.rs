// src/config/validate.rs

use crate::config::model::{ConvergenceSection, EdgeStrategies, JobConfig, JobSection, RawJobConfig};
use crate::errors::{IterdagError, Result};
use crate::types::ShipStrategy;

impl TryFrom<RawJobConfig> for JobConfig {
    type Error = IterdagError;

    fn try_from(raw: RawJobConfig) -> std::result::Result<Self, Self::Error> {
        let edges = raw.edges.resolve();
        validate_job(&raw.job)?;
        validate_convergence(&raw.convergence)?;
        validate_edges(&edges, raw.job.parallelism)?;
        Ok(JobConfig::new_unchecked(
            raw.job,
            edges,
            raw.convergence,
            raw.keys,
            raw.io,
        ))
    }
}

fn validate_job(job: &JobSection) -> Result<()> {
    if job.parallelism == 0 {
        return Err(IterdagError::ConfigError(
            "[job].parallelism must be >= 1 (got 0)".to_string(),
        ));
    }
    if job.memory_per_partition_mb == 0 {
        return Err(IterdagError::ConfigError(
            "[job].memory_per_partition_mb must be > 0".to_string(),
        ));
    }
    if job.memory_per_partition_bytes == Some(0) {
        return Err(IterdagError::ConfigError(
            "[job].memory_per_partition_bytes must be > 0".to_string(),
        ));
    }
    if job.max_file_handles < 2 {
        return Err(IterdagError::ConfigError(format!(
            "[job].max_file_handles must be >= 2 (got {})",
            job.max_file_handles
        )));
    }
    if job.channel_capacity == 0 {
        return Err(IterdagError::ConfigError(
            "[job].channel_capacity must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn validate_convergence(section: &ConvergenceSection) -> Result<()> {
    if !section.epsilon.is_finite() || section.epsilon < 0.0 {
        return Err(IterdagError::ConfigError(format!(
            "[convergence].epsilon must be a finite, non-negative number (got {})",
            section.epsilon
        )));
    }
    Ok(())
}

/// The state must come back to the Head partition that owns its key, so both
/// edges that decide key placement have to hash when there is more than one
/// partition.
fn validate_edges(edges: &EdgeStrategies, parallelism: usize) -> Result<()> {
    if parallelism <= 1 {
        return Ok(());
    }
    for (name, strategy) in [
        ("seed_to_head", edges.seed_to_head),
        ("intermediate_to_tail", edges.intermediate_to_tail),
    ] {
        if strategy != ShipStrategy::PartitionHash {
            return Err(IterdagError::ConfigError(format!(
                "[edges].{name} must be \"partition_hash\" when parallelism > 1 (got \"{strategy}\")"
            )));
        }
    }
    if edges.tail_to_delta == ShipStrategy::Broadcast && edges.head_to_delta == ShipStrategy::Broadcast
    {
        return Err(IterdagError::ConfigError(
            "[edges].head_to_delta and [edges].tail_to_delta cannot both be \"broadcast\"".to_string(),
        ));
    }
    validate_join_inputs(edges)?;
    if edges.head_to_output == ShipStrategy::Broadcast {
        return Err(IterdagError::ConfigError(
            "[edges].head_to_output cannot be \"broadcast\" when parallelism > 1: every partition would write the whole working set".to_string(),
        ));
    }
    Ok(())
}

/// Each (working record, companion record) pair must meet in exactly one
/// Intermediate partition. Either one side is broadcast and the other is
/// split, or both sides are placed by key hash. Head's working set is already
/// hash-placed, so forwarding it counts as hashed.
fn validate_join_inputs(edges: &EdgeStrategies) -> Result<()> {
    let working = edges.head_to_intermediate;
    let companion = edges.companion_to_intermediate;
    match (working, companion) {
        (ShipStrategy::Broadcast, ShipStrategy::Broadcast) => Err(IterdagError::ConfigError(
            "[edges].head_to_intermediate and [edges].companion_to_intermediate cannot both be \"broadcast\" when parallelism > 1: every partition would emit the same partials".to_string(),
        )),
        (ShipStrategy::Broadcast, _) | (_, ShipStrategy::Broadcast) => Ok(()),
        (_, ShipStrategy::PartitionHash) => Ok(()),
        (_, other) => Err(IterdagError::ConfigError(format!(
            "[edges].companion_to_intermediate must be \"partition_hash\" or \"broadcast\" when the working set is not broadcast and parallelism > 1 (got \"{other}\")"
        ))),
    }
}
