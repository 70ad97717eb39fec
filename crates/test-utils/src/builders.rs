#![allow(dead_code)]

use iterdag::config::{CriterionKind, JobConfig, RawJobConfig};
use iterdag::record::KeyLayout;
use iterdag::types::{ShipStrategy, Superstep};

/// Builder for `JobConfig` to simplify test setup.
///
/// Starts from the defaults of an empty TOML file.
pub struct JobConfigBuilder {
    config: RawJobConfig,
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RawJobConfig::default(),
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.config.job.name = name.to_string();
        self
    }

    pub fn parallelism(mut self, parallelism: usize) -> Self {
        self.config.job.parallelism = parallelism;
        self
    }

    pub fn max_supersteps(mut self, max: Superstep) -> Self {
        self.config.job.max_supersteps = max;
        self
    }

    pub fn memory_mb(mut self, mb: usize) -> Self {
        self.config.job.memory_per_partition_mb = mb;
        self
    }

    /// Byte-exact partition budget, small enough to make the Tail spill.
    pub fn memory_bytes(mut self, bytes: usize) -> Self {
        self.config.job.memory_per_partition_bytes = Some(bytes);
        self
    }

    pub fn max_file_handles(mut self, handles: usize) -> Self {
        self.config.job.max_file_handles = handles;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.job.channel_capacity = capacity;
        self
    }

    pub fn epsilon(mut self, epsilon: f64) -> Self {
        self.config.convergence.criterion = CriterionKind::L1Norm;
        self.config.convergence.epsilon = epsilon;
        self
    }

    pub fn cap_only(mut self) -> Self {
        self.config.convergence.criterion = CriterionKind::MaxSupersteps;
        self
    }

    pub fn keys(mut self, keys: KeyLayout) -> Self {
        self.config.keys = keys;
        self
    }

    pub fn head_to_intermediate(mut self, strategy: ShipStrategy) -> Self {
        self.config.edges.head_to_intermediate = Some(strategy);
        self
    }

    pub fn companion_to_intermediate(mut self, strategy: ShipStrategy) -> Self {
        self.config.edges.companion_to_intermediate = Some(strategy);
        self
    }

    pub fn raw(self) -> RawJobConfig {
        self.config
    }

    pub fn build(self) -> JobConfig {
        JobConfig::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for JobConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
