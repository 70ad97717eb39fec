use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use iterdag::iteration::IterationProbe;
use iterdag::record::Record;
use iterdag::sort::SortStats;
use iterdag::types::{PartitionId, Superstep};

type Frames = BTreeMap<(PartitionId, Superstep), Vec<Record>>;

/// Probe that keeps every head read, backchannel write and tail sort, keyed by
/// `(partition, superstep)`.
#[derive(Debug, Clone, Default)]
pub struct RecordingProbe {
    head_reads: Arc<Mutex<Frames>>,
    backchannel_writes: Arc<Mutex<Frames>>,
    tail_sorts: Arc<Mutex<BTreeMap<(PartitionId, Superstep), SortStats>>>,
}

impl RecordingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head_reads(&self) -> Frames {
        self.head_reads.lock().unwrap().clone()
    }

    pub fn backchannel_writes(&self) -> Frames {
        self.backchannel_writes.lock().unwrap().clone()
    }

    pub fn tail_sorts(&self) -> BTreeMap<(PartitionId, Superstep), SortStats> {
        self.tail_sorts.lock().unwrap().clone()
    }
}

impl IterationProbe for RecordingProbe {
    fn head_read(&self, partition: PartitionId, superstep: Superstep, records: &[Record]) {
        self.head_reads
            .lock()
            .unwrap()
            .insert((partition, superstep), records.to_vec());
    }

    fn backchannel_write(&self, partition: PartitionId, target: Superstep, records: &[Record]) {
        self.backchannel_writes
            .lock()
            .unwrap()
            .insert((partition, target), records.to_vec());
    }

    fn tail_sorted(&self, partition: PartitionId, superstep: Superstep, stats: SortStats) {
        self.tail_sorts
            .lock()
            .unwrap()
            .insert((partition, superstep), stats);
    }
}
