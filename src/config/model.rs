// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::record::KeyLayout;
use crate::types::{ShipStrategy, Superstep};

/// Job configuration as read from a TOML file.
///
/// ```toml
/// [job]
/// name = "PageRankWithTermination"
/// parallelism = 2
/// memory_per_partition_mb = 25
/// max_supersteps = 5
///
/// [convergence]
/// criterion = "l1_norm"
/// epsilon = 1e-6
///
/// [io]
/// seed = "pageWithRank.txt"
/// companion = "transitionMatrix.txt"
/// output = "out/"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJobConfig {
    #[serde(default)]
    pub job: JobSection,

    /// Ship strategy overrides per edge.
    #[serde(default)]
    pub edges: EdgeSection,

    #[serde(default)]
    pub convergence: ConvergenceSection,

    #[serde(default)]
    pub keys: KeyLayout,

    #[serde(default)]
    pub io: IoSection,
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    #[serde(default = "default_name")]
    pub name: String,

    /// Number of partitions of every role.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Memory budget per partition, used by the Tail's sorter.
    #[serde(default = "default_memory_mb")]
    pub memory_per_partition_mb: usize,

    /// Exact budget in bytes; overrides `memory_per_partition_mb` when set.
    #[serde(default)]
    pub memory_per_partition_bytes: Option<usize>,

    /// Upper bound on the superstep index.
    #[serde(default = "default_max_supersteps")]
    pub max_supersteps: Superstep,

    /// Merge fan-in of the spilling sorter.
    #[serde(default = "default_max_file_handles")]
    pub max_file_handles: usize,

    /// Capacity of every bounded edge queue.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_name() -> String {
    "iterdag-job".to_string()
}

fn default_parallelism() -> usize {
    1
}

fn default_memory_mb() -> usize {
    25
}

fn default_max_supersteps() -> Superstep {
    10
}

fn default_max_file_handles() -> usize {
    16
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for JobSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            parallelism: default_parallelism(),
            memory_per_partition_mb: default_memory_mb(),
            memory_per_partition_bytes: None,
            max_supersteps: default_max_supersteps(),
            max_file_handles: default_max_file_handles(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

/// `[edges]` section. Unset edges keep the PageRank wiring.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EdgeSection {
    pub seed_to_head: Option<ShipStrategy>,
    pub head_to_intermediate: Option<ShipStrategy>,
    pub companion_to_intermediate: Option<ShipStrategy>,
    pub intermediate_to_tail: Option<ShipStrategy>,
    pub head_to_delta: Option<ShipStrategy>,
    pub tail_to_delta: Option<ShipStrategy>,
    pub head_to_output: Option<ShipStrategy>,
}

/// Resolved ship strategy of every configurable edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeStrategies {
    pub seed_to_head: ShipStrategy,
    pub head_to_intermediate: ShipStrategy,
    pub companion_to_intermediate: ShipStrategy,
    pub intermediate_to_tail: ShipStrategy,
    pub head_to_delta: ShipStrategy,
    pub tail_to_delta: ShipStrategy,
    pub head_to_output: ShipStrategy,
}

impl Default for EdgeStrategies {
    fn default() -> Self {
        Self {
            seed_to_head: ShipStrategy::PartitionHash,
            head_to_intermediate: ShipStrategy::Broadcast,
            companion_to_intermediate: ShipStrategy::PartitionHash,
            intermediate_to_tail: ShipStrategy::PartitionHash,
            head_to_delta: ShipStrategy::Broadcast,
            tail_to_delta: ShipStrategy::Forward,
            head_to_output: ShipStrategy::Forward,
        }
    }
}

impl EdgeSection {
    pub fn resolve(&self) -> EdgeStrategies {
        let d = EdgeStrategies::default();
        EdgeStrategies {
            seed_to_head: self.seed_to_head.unwrap_or(d.seed_to_head),
            head_to_intermediate: self.head_to_intermediate.unwrap_or(d.head_to_intermediate),
            companion_to_intermediate: self
                .companion_to_intermediate
                .unwrap_or(d.companion_to_intermediate),
            intermediate_to_tail: self.intermediate_to_tail.unwrap_or(d.intermediate_to_tail),
            head_to_delta: self.head_to_delta.unwrap_or(d.head_to_delta),
            tail_to_delta: self.tail_to_delta.unwrap_or(d.tail_to_delta),
            head_to_output: self.head_to_output.unwrap_or(d.head_to_output),
        }
    }
}

/// Which convergence criterion Sync evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    #[default]
    L1Norm,
    MaxSupersteps,
}

/// `[convergence]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvergenceSection {
    #[serde(default)]
    pub criterion: CriterionKind,

    /// Threshold for `l1_norm`; ignored by `max_supersteps`.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

fn default_epsilon() -> f64 {
    1e-6
}

impl Default for ConvergenceSection {
    fn default() -> Self {
        Self {
            criterion: CriterionKind::default(),
            epsilon: default_epsilon(),
        }
    }
}

/// `[io]` section. Paths are resolved relative to the config file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IoSection {
    pub seed: Option<PathBuf>,
    pub companion: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

/// Validated job configuration.
///
/// Only constructed through `TryFrom<RawJobConfig>`, so every instance has
/// passed validation.
#[derive(Debug, Clone)]
pub struct JobConfig {
    pub job: JobSection,
    pub edges: EdgeStrategies,
    pub convergence: ConvergenceSection,
    pub keys: KeyLayout,
    pub io: IoSection,
}

impl JobConfig {
    pub(crate) fn new_unchecked(
        job: JobSection,
        edges: EdgeStrategies,
        convergence: ConvergenceSection,
        keys: KeyLayout,
        io: IoSection,
    ) -> Self {
        Self {
            job,
            edges,
            convergence,
            keys,
            io,
        }
    }

    /// Memory budget per partition in bytes.
    pub fn memory_budget(&self) -> usize {
        self.job
            .memory_per_partition_bytes
            .unwrap_or_else(|| self.job.memory_per_partition_mb.saturating_mul(1024 * 1024))
    }
}
