// src/channel/mod.rs

//! In-process channel substrate between stage partitions.
//!
//! - [`router`] routes records of one sending partition by ship strategy.
//! - [`gate`] buffers incoming records per superstep and only releases a
//!   superstep once every expected sender has marked its end.
//!
//! Every receiving partition owns one bounded mpsc queue per edge. All
//! senders of the edge hold a clone of its `Sender`, so delivery order is
//! preserved per sender→receiver pair and a full queue blocks the sender.

pub mod gate;
pub mod router;

use tokio::sync::mpsc;

use crate::record::Record;
use crate::types::{PartitionId, ShipStrategy, Superstep};

pub use gate::InputGate;
pub use router::{partition_for, EdgeSender};

/// Unit of transfer on an edge.
#[derive(Debug, Clone)]
pub enum Envelope {
    Record {
        sender: PartitionId,
        record: Record,
    },
    /// The sender has emitted everything it will emit for `superstep`.
    EndOfSuperstep {
        sender: PartitionId,
        superstep: Superstep,
    },
}

/// Static description of one data edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    pub name: &'static str,
    pub strategy: ShipStrategy,
    /// Field used for `PartitionHash` routing.
    pub key_field: usize,
    pub senders: usize,
    pub receivers: usize,
}

impl EdgeSpec {
    /// Number of end-of-superstep markers each receiver waits for.
    pub fn expected_senders(&self) -> usize {
        match self.strategy {
            ShipStrategy::Forward => 1,
            ShipStrategy::PartitionHash | ShipStrategy::Broadcast => self.senders,
        }
    }
}

/// Create the queues for an edge: one [`EdgeSender`] per sending partition
/// and one [`InputGate`] per receiving partition.
pub fn wire_edge(spec: EdgeSpec, capacity: usize) -> (Vec<EdgeSender>, Vec<InputGate>) {
    let mut txs = Vec::with_capacity(spec.receivers);
    let mut gates = Vec::with_capacity(spec.receivers);

    for _ in 0..spec.receivers {
        let (tx, rx) = mpsc::channel::<Envelope>(capacity.max(1));
        txs.push(tx);
        gates.push(InputGate::new(spec.name, rx, spec.expected_senders()));
    }

    let senders = (0..spec.senders)
        .map(|partition| EdgeSender::new(spec, partition, txs.clone()))
        .collect();

    (senders, gates)
}
