// src/iteration/probe.rs

use std::fmt::Debug;

use crate::record::Record;
use crate::sort::SortStats;
use crate::types::{PartitionId, Superstep};

/// Read-only hook into the state hand-off, for diagnostics and tests.
pub trait IterationProbe: Send + Sync + Debug {
    /// Head of `partition` read `records` as its state for `superstep`.
    fn head_read(&self, _partition: PartitionId, _superstep: Superstep, _records: &[Record]) {}

    /// Tail of `partition` published `records` for superstep `target`.
    fn backchannel_write(&self, _partition: PartitionId, _target: Superstep, _records: &[Record]) {}

    /// Tail of `partition` finished grouping its input for `superstep`.
    fn tail_sorted(&self, _partition: PartitionId, _superstep: Superstep, _stats: SortStats) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProbe;

impl IterationProbe for NoopProbe {}
