// src/io/mod.rs

//! External collaborators at the edges of the job: where the seed and
//! companion inputs come from and where the final state goes.
//!
//! - [`RecordSource`] is read once, at superstep 0, split per partition.
//! - [`RecordSink`] receives exactly one record set per partition, at
//!   termination.
//! - [`text`] provides file-backed implementations on top of
//!   [`crate::fs::FileSystem`].

pub mod text;

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use crate::errors::Result;
use crate::record::Record;
use crate::types::PartitionId;

pub use text::{TextDirSink, TextFileSource};

pub trait RecordSource: Send + Sync + Debug {
    /// Records of split `split` out of `splits`. Every record must belong to
    /// exactly one split.
    fn read_split(&self, split: usize, splits: usize) -> Result<Vec<Record>>;
}

pub trait RecordSink: Send + Sync + Debug {
    /// Accept the final record set of one partition. Called once per
    /// partition.
    fn write_partition(&self, partition: PartitionId, records: &[Record]) -> Result<()>;
}

/// Round-robin split by position.
pub(crate) fn take_split(records: Vec<Record>, split: usize, splits: usize) -> Vec<Record> {
    let splits = splits.max(1);
    records
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % splits == split)
        .map(|(_, r)| r)
        .collect()
}

/// Source over an in-memory record list.
#[derive(Debug, Clone, Default)]
pub struct VecSource {
    records: Vec<Record>,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }
}

impl RecordSource for VecSource {
    fn read_split(&self, split: usize, splits: usize) -> Result<Vec<Record>> {
        Ok(take_split(self.records.clone(), split, splits))
    }
}

/// Sink that keeps the final output in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    partitions: Arc<Mutex<BTreeMap<PartitionId, Vec<Record>>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Final output per partition.
    pub fn partitions(&self) -> BTreeMap<PartitionId, Vec<Record>> {
        self.lock().clone()
    }

    /// Final output of all partitions, in partition order.
    pub fn records(&self) -> Vec<Record> {
        self.lock().values().flatten().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<PartitionId, Vec<Record>>> {
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordSink for MemorySink {
    fn write_partition(&self, partition: PartitionId, records: &[Record]) -> Result<()> {
        let mut partitions = self.lock();
        if partitions.contains_key(&partition) {
            return Err(anyhow!("output partition {partition} written twice").into());
        }
        partitions.insert(partition, records.to_vec());
        Ok(())
    }
}
