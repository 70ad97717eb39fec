// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Index of one synchronous round, starting at 0.
pub type Superstep = u32;

/// Index of one of the `parallelism` statically assigned instances of a role.
pub type PartitionId = usize;

/// How records on an edge are routed to receiving partitions.
///
/// - `Forward`: pointwise, sender `p` delivers to receiver `p`.
/// - `PartitionHash`: redistribute by the record key.
/// - `Broadcast`: every receiver gets every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipStrategy {
    Forward,
    PartitionHash,
    Broadcast,
}

impl FromStr for ShipStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "forward" => Ok(ShipStrategy::Forward),
            "partition_hash" | "hash" => Ok(ShipStrategy::PartitionHash),
            "broadcast" => Ok(ShipStrategy::Broadcast),
            other => Err(format!(
                "invalid ship strategy: {other} (expected \"forward\", \"partition_hash\" or \"broadcast\")"
            )),
        }
    }
}

impl fmt::Display for ShipStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShipStrategy::Forward => "forward",
            ShipStrategy::PartitionHash => "partition_hash",
            ShipStrategy::Broadcast => "broadcast",
        };
        f.write_str(s)
    }
}

/// The parts of an iterative job. Used for logging, error context and the
/// job graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    SeedSource,
    CompanionSource,
    TransitionSource,
    Head,
    Intermediate,
    Tail,
    DeltaPath,
    Sync,
    Output,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SeedSource => "seed-source",
            Role::CompanionSource => "companion-source",
            Role::TransitionSource => "transition-source",
            Role::Head => "head",
            Role::Intermediate => "intermediate",
            Role::Tail => "tail",
            Role::DeltaPath => "delta-path",
            Role::Sync => "sync",
            Role::Output => "output",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision produced once per superstep by a convergence criterion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvergenceVerdict {
    pub converged: bool,
    pub reason: Option<String>,
}

impl ConvergenceVerdict {
    pub fn converged(reason: impl Into<String>) -> Self {
        Self {
            converged: true,
            reason: Some(reason.into()),
        }
    }

    pub fn not_converged() -> Self {
        Self {
            converged: false,
            reason: None,
        }
    }
}
