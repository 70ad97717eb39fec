// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::types::{PartitionId, Role};

#[derive(Error, Debug)]
pub enum IterdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A record failed key extraction or type expectations.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// A superstep tag arrived that the receiver cannot place.
    #[error("Barrier mismatch: {0}")]
    BarrierMismatch(String),

    /// Secondary storage could not absorb a spill.
    #[error("Spill failed: {0}")]
    SpillFailed(String),

    /// A peer went away before completing its part of the protocol.
    #[error("Channel disconnected: {0}")]
    Disconnected(String),

    #[error("{role} partition {partition} failed: {source}")]
    StageFailed {
        role: Role,
        partition: PartitionId,
        #[source]
        source: Box<IterdagError>,
    },

    #[error("Cycle detected in job graph: {0}")]
    DagCycle(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl IterdagError {
    /// Wrap an error with the role and partition that raised it.
    pub fn in_stage(self, role: Role, partition: PartitionId) -> Self {
        match self {
            already @ IterdagError::StageFailed { .. } => already,
            other => IterdagError::StageFailed {
                role,
                partition,
                source: Box::new(other),
            },
        }
    }

    /// Whether this error is only a consequence of another worker failing.
    pub fn is_secondary(&self) -> bool {
        match self {
            IterdagError::Disconnected(_) => true,
            IterdagError::StageFailed { source, .. } => source.is_secondary(),
            _ => false,
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, IterdagError>;
