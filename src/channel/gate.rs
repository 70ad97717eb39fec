// src/channel/gate.rs

//! Per-edge superstep gating.
//!
//! Senders progress unevenly: a fast partition may already be emitting
//! superstep `s+1` while a slow one is still in `s`. The gate keeps, for
//! every sender, the superstep its next record belongs to (advanced by that
//! sender's end-of-superstep marker) and buckets records accordingly. A
//! superstep is released only after markers from all expected senders.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::channel::Envelope;
use crate::errors::{IterdagError, Result};
use crate::record::Record;
use crate::types::{PartitionId, Superstep};

#[derive(Debug)]
pub struct InputGate {
    edge: &'static str,
    rx: mpsc::Receiver<Envelope>,
    expected_senders: usize,
    /// Superstep the next record of each sender belongs to.
    sender_superstep: BTreeMap<PartitionId, Superstep>,
    buckets: BTreeMap<Superstep, BTreeMap<PartitionId, VecDeque<Record>>>,
    markers: BTreeMap<Superstep, usize>,
    /// Supersteps below this have been handed out completely.
    released_below: Superstep,
}

impl InputGate {
    pub fn new(edge: &'static str, rx: mpsc::Receiver<Envelope>, expected_senders: usize) -> Self {
        Self {
            edge,
            rx,
            expected_senders,
            sender_superstep: BTreeMap::new(),
            buckets: BTreeMap::new(),
            markers: BTreeMap::new(),
            released_below: 0,
        }
    }

    pub fn edge(&self) -> &'static str {
        self.edge
    }

    pub fn expected_senders(&self) -> usize {
        self.expected_senders
    }

    /// Whether every expected sender has marked the end of `superstep`.
    pub fn is_complete(&self, superstep: Superstep) -> bool {
        self.markers.get(&superstep).copied().unwrap_or(0) >= self.expected_senders
    }

    /// Number of records already buffered for `superstep`.
    pub fn buffered(&self, superstep: Superstep) -> usize {
        self.buckets
            .get(&superstep)
            .map(|per_sender| per_sender.values().map(VecDeque::len).sum())
            .unwrap_or(0)
    }

    /// Stream the next record of `superstep`, or `None` once the superstep is
    /// complete and fully drained.
    pub async fn next(&mut self, superstep: Superstep) -> Result<Option<Record>> {
        self.check_not_released(superstep)?;

        loop {
            if let Some(record) = self.pop_buffered(superstep) {
                return Ok(Some(record));
            }
            if self.is_complete(superstep) {
                self.release(superstep);
                return Ok(None);
            }
            self.receive_one(superstep).await?;
        }
    }

    /// Wait until `superstep` is complete and return all of its records,
    /// ordered by sender index, then arrival.
    pub async fn collect(&mut self, superstep: Superstep) -> Result<Vec<Record>> {
        self.check_not_released(superstep)?;

        while !self.is_complete(superstep) {
            self.receive_one(superstep).await?;
        }

        let records = self
            .buckets
            .remove(&superstep)
            .map(|per_sender| per_sender.into_values().flatten().collect())
            .unwrap_or_default();
        self.release(superstep);

        Ok(records)
    }

    fn check_not_released(&self, superstep: Superstep) -> Result<()> {
        if superstep < self.released_below {
            return Err(IterdagError::BarrierMismatch(format!(
                "edge '{}': superstep {} requested but supersteps below {} were already released",
                self.edge, superstep, self.released_below
            )));
        }
        Ok(())
    }

    fn pop_buffered(&mut self, superstep: Superstep) -> Option<Record> {
        let per_sender = self.buckets.get_mut(&superstep)?;
        per_sender.values_mut().find_map(VecDeque::pop_front)
    }

    fn release(&mut self, superstep: Superstep) {
        self.buckets.remove(&superstep);
        self.markers.remove(&superstep);
        self.released_below = superstep + 1;
    }

    async fn receive_one(&mut self, waiting_for: Superstep) -> Result<()> {
        let envelope = self.rx.recv().await.ok_or_else(|| {
            IterdagError::Disconnected(format!(
                "edge '{}' closed before superstep {} was complete ({} of {} markers)",
                self.edge,
                waiting_for,
                self.markers.get(&waiting_for).copied().unwrap_or(0),
                self.expected_senders
            ))
        })?;

        match envelope {
            Envelope::Record { sender, record } => {
                let superstep = self.superstep_of(sender)?;
                if superstep < self.released_below {
                    return Err(IterdagError::BarrierMismatch(format!(
                        "edge '{}': record from sender {} tagged with released superstep {}",
                        self.edge, sender, superstep
                    )));
                }
                if superstep > waiting_for {
                    trace!(
                        edge = self.edge,
                        sender,
                        superstep,
                        waiting_for,
                        "buffering record from a sender that is ahead"
                    );
                }
                self.buckets
                    .entry(superstep)
                    .or_default()
                    .entry(sender)
                    .or_default()
                    .push_back(record);
            }
            Envelope::EndOfSuperstep { sender, superstep } => {
                let current = self.superstep_of(sender)?;
                if superstep != current {
                    return Err(IterdagError::BarrierMismatch(format!(
                        "edge '{}': sender {} marked end of superstep {} while at superstep {}",
                        self.edge, sender, superstep, current
                    )));
                }
                self.sender_superstep.insert(sender, current + 1);
                let seen = self.markers.entry(superstep).or_insert(0);
                *seen += 1;
                debug!(
                    edge = self.edge,
                    sender,
                    superstep,
                    seen = *seen,
                    expected = self.expected_senders,
                    "end-of-superstep marker received"
                );
            }
        }

        Ok(())
    }

    /// Superstep the given sender is currently emitting, registering the
    /// sender on first contact.
    fn superstep_of(&mut self, sender: PartitionId) -> Result<Superstep> {
        if let Some(s) = self.sender_superstep.get(&sender) {
            return Ok(*s);
        }
        if self.sender_superstep.len() >= self.expected_senders {
            return Err(IterdagError::BarrierMismatch(format!(
                "edge '{}': unexpected sender {} (expected {} senders)",
                self.edge, sender, self.expected_senders
            )));
        }
        self.sender_superstep.insert(sender, self.released_below);
        Ok(self.released_below)
    }
}
