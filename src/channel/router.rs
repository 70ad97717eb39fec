// src/channel/router.rs

//! Ship-strategy routing for one sending partition.

use tokio::sync::mpsc;
use tracing::trace;

use crate::channel::{EdgeSpec, Envelope};
use crate::errors::{IterdagError, Result};
use crate::record::{Key, Record};
use crate::types::{PartitionId, ShipStrategy, Superstep};

/// Stable hash partitioning: blake3 over the key's canonical bytes.
///
/// Unlike `std`'s hashers this is identical across processes, platforms and
/// compiler versions, so a key always lands in the same backchannel slot.
pub fn partition_for(key: &Key, parallelism: usize) -> PartitionId {
    if parallelism <= 1 {
        return 0;
    }
    let digest = blake3::hash(&key.canonical_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % parallelism as u64) as PartitionId
}

/// The sending side of an edge for one partition.
#[derive(Debug, Clone)]
pub struct EdgeSender {
    spec: EdgeSpec,
    partition: PartitionId,
    receivers: Vec<mpsc::Sender<Envelope>>,
}

impl EdgeSender {
    pub fn new(spec: EdgeSpec, partition: PartitionId, receivers: Vec<mpsc::Sender<Envelope>>) -> Self {
        Self {
            spec,
            partition,
            receivers,
        }
    }

    pub fn spec(&self) -> &EdgeSpec {
        &self.spec
    }

    /// Route a single record.
    pub async fn send(&self, record: Record) -> Result<()> {
        match self.spec.strategy {
            ShipStrategy::Forward => self.deliver(self.forward_target()?, record).await,
            ShipStrategy::PartitionHash => {
                let key = record.key(self.spec.key_field)?;
                let target = partition_for(&key, self.receivers.len());
                self.deliver(target, record).await
            }
            ShipStrategy::Broadcast => {
                let last = self.receivers.len().saturating_sub(1);
                for target in 0..last {
                    self.deliver(target, record.clone()).await?;
                }
                self.deliver(last, record).await
            }
        }
    }

    pub async fn send_all<I>(&self, records: I) -> Result<()>
    where
        I: IntoIterator<Item = Record>,
    {
        for record in records {
            self.send(record).await?;
        }
        Ok(())
    }

    /// Emit the end-of-superstep marker to every receiver that expects one
    /// from this partition.
    pub async fn end_superstep(&self, superstep: Superstep) -> Result<()> {
        trace!(
            edge = self.spec.name,
            partition = self.partition,
            superstep,
            "sending end-of-superstep marker"
        );

        let marker = Envelope::EndOfSuperstep {
            sender: self.partition,
            superstep,
        };

        match self.spec.strategy {
            ShipStrategy::Forward => self.push(self.forward_target()?, marker).await,
            ShipStrategy::PartitionHash | ShipStrategy::Broadcast => {
                for target in 0..self.receivers.len() {
                    self.push(target, marker.clone()).await?;
                }
                Ok(())
            }
        }
    }

    fn forward_target(&self) -> Result<PartitionId> {
        if self.partition < self.receivers.len() {
            Ok(self.partition)
        } else {
            Err(IterdagError::ConfigError(format!(
                "edge '{}' is forward but has no receiver for partition {}",
                self.spec.name, self.partition
            )))
        }
    }

    async fn deliver(&self, target: PartitionId, record: Record) -> Result<()> {
        self.push(
            target,
            Envelope::Record {
                sender: self.partition,
                record,
            },
        )
        .await
    }

    async fn push(&self, target: PartitionId, envelope: Envelope) -> Result<()> {
        self.receivers[target].send(envelope).await.map_err(|_| {
            IterdagError::Disconnected(format!(
                "edge '{}': receiver {} is gone",
                self.spec.name, target
            ))
        })
    }
}
