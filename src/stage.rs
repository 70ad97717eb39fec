// src/stage.rs

//! User computation plugged into the iteration roles.
//!
//! Stages are pure with respect to iteration control: they never see
//! supersteps, channels or the barrier. Every method returns a `Result` so
//! that a stage can reject a record it cannot interpret; the scaffold then
//! fails the job.

use std::fmt::Debug;

use crate::errors::Result;
use crate::record::{Key, Record};

/// Per-record transformation run by the Head.
///
/// `companion` is the broadcast transition set when the job configures one,
/// and empty otherwise.
pub trait MapStage: Send + Sync + Debug {
    fn map(&self, record: Record, companion: &[Record], out: &mut Vec<Record>) -> Result<()>;
}

/// Key-equi-join run by the Intermediate for every matching pair of
/// (working-set record, static companion record).
pub trait MatchStage: Send + Sync + Debug {
    fn join(&self, working: &Record, companion: &Record, out: &mut Vec<Record>) -> Result<()>;
}

/// Commutative, associative aggregation run by the Tail once per key.
pub trait ReduceStage: Send + Sync + Debug {
    fn reduce(&self, key: &Key, group: Vec<Record>) -> Result<Record>;
}

/// Per-key change between the state a superstep started from and the state
/// it produced. The delta path sums the absolute values per partition.
pub trait DeltaStage: Send + Sync + Debug {
    fn delta(&self, previous: &Record, current: &Record) -> Result<f64>;
}

/// Emits every record unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityMap;

impl MapStage for IdentityMap {
    fn map(&self, record: Record, _companion: &[Record], out: &mut Vec<Record>) -> Result<()> {
        out.push(record);
        Ok(())
    }
}
