// src/iteration/backchannel.rs

//! Per-partition hand-off from Tail to the next superstep's Head.
//!
//! A single slot, overwritten every superstep. Each frame is tagged with the
//! superstep that is allowed to read it, so a Head that gets ahead of its Tail
//! blocks instead of reading the previous round's state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::errors::{IterdagError, Result};
use crate::record::Record;
use crate::types::{PartitionId, Superstep};

#[derive(Debug, Clone)]
pub struct BackchannelFrame {
    /// Superstep whose Head consumes this frame.
    pub target: Superstep,
    pub records: Arc<[Record]>,
}

/// Write half, owned by the partition's Tail.
#[derive(Debug)]
pub struct BackchannelWriter {
    partition: PartitionId,
    tx: watch::Sender<Option<BackchannelFrame>>,
}

/// Read half, owned by the partition's Head.
#[derive(Debug)]
pub struct BackchannelReader {
    partition: PartitionId,
    rx: watch::Receiver<Option<BackchannelFrame>>,
}

pub fn backchannel(partition: PartitionId) -> (BackchannelWriter, BackchannelReader) {
    let (tx, rx) = watch::channel(None);
    (
        BackchannelWriter { partition, tx },
        BackchannelReader { partition, rx },
    )
}

impl BackchannelWriter {
    /// Publish the state for superstep `target`, replacing the previous frame.
    pub fn write(&self, target: Superstep, records: Vec<Record>) -> Result<()> {
        if let Some(previous) = self.tx.borrow().as_ref() {
            if target <= previous.target {
                return Err(IterdagError::BarrierMismatch(format!(
                    "backchannel {}: write for superstep {} after superstep {}",
                    self.partition, target, previous.target
                )));
            }
        }

        debug!(
            partition = self.partition,
            target,
            records = records.len(),
            "backchannel write"
        );

        let frame = BackchannelFrame {
            target,
            records: records.into(),
        };
        // `send_replace` keeps the slot even when the reader is momentarily
        // not subscribed.
        self.tx.send_replace(Some(frame));
        Ok(())
    }
}

impl BackchannelReader {
    /// Wait for the frame written for `superstep` and return its records.
    pub async fn read(&mut self, superstep: Superstep) -> Result<Arc<[Record]>> {
        let partition = self.partition;
        let frame = self
            .rx
            .wait_for(|slot| matches!(slot, Some(f) if f.target >= superstep))
            .await
            .map_err(|_| {
                IterdagError::Disconnected(format!(
                    "backchannel {partition}: writer dropped before superstep {superstep}"
                ))
            })?
            .clone();

        // `wait_for` only returns once the predicate holds.
        let Some(frame) = frame else {
            return Err(IterdagError::Disconnected(format!(
                "backchannel {partition}: empty slot for superstep {superstep}"
            )));
        };

        if frame.target != superstep {
            return Err(IterdagError::BarrierMismatch(format!(
                "backchannel {}: head at superstep {} found state for superstep {}",
                partition, superstep, frame.target
            )));
        }

        Ok(frame.records)
    }
}
