// src/sync/mod.rs

//! Barrier and termination authority.
//!
//! The pure state machine lives in [`barrier`]; [`worker`] is the async shell
//! that feeds it signals from the cycle's workers and publishes the resulting
//! control events. [`criterion`] holds the pluggable convergence checks.

pub mod barrier;
pub mod criterion;
pub mod worker;

use tokio::sync::watch;

use crate::errors::{IterdagError, Result};
use crate::types::{PartitionId, Role, Superstep};

pub use barrier::{Barrier, BarrierSignal, BarrierState, BarrierStep, Decision, TerminationReason};
pub use criterion::{ConvergenceCriterion, FnCriterion, L1NormCriterion, MaxSuperstepsOnly};
pub use worker::{SyncOutcome, SyncWorker};

/// Message from a cycle worker to Sync.
#[derive(Debug)]
pub enum SyncSignal {
    Barrier(BarrierSignal),
    /// A worker failed; the whole job must stop.
    Abort {
        role: Role,
        partition: PartitionId,
        error: IterdagError,
    },
}

/// Event published by Sync to every worker of the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// Workers may run `superstep`.
    Proceed(Superstep),
    /// Stop after `superstep`; output is finalised from it.
    Halt { superstep: Superstep },
    /// A worker failed; stop immediately.
    Abort,
}

/// What a worker should do after finishing a superstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Next(Superstep),
    Halt,
}

/// Worker-side view of the control channel.
#[derive(Debug, Clone)]
pub struct ControlReceiver {
    rx: watch::Receiver<ControlEvent>,
}

impl ControlReceiver {
    pub fn new(rx: watch::Receiver<ControlEvent>) -> Self {
        Self { rx }
    }

    /// Block until Sync has decided what follows `finished`.
    ///
    /// Workers that never signal the barrier (the output sink) may trail the
    /// published superstep. They step forward one superstep at a time and only
    /// halt on the superstep that was actually halted.
    pub async fn after(&mut self, finished: Superstep) -> Result<Control> {
        let event = *self
            .rx
            .wait_for(|event| match event {
                ControlEvent::Proceed(next) => *next > finished,
                ControlEvent::Halt { .. } | ControlEvent::Abort => true,
            })
            .await
            .map_err(|_| {
                IterdagError::Disconnected(format!(
                    "sync went away while workers waited after superstep {finished}"
                ))
            })?;

        match event {
            ControlEvent::Proceed(_) => Ok(Control::Next(finished + 1)),
            ControlEvent::Halt { superstep } if superstep == finished => Ok(Control::Halt),
            ControlEvent::Halt { superstep } if superstep > finished => {
                Ok(Control::Next(finished + 1))
            }
            ControlEvent::Halt { superstep } => Err(IterdagError::BarrierMismatch(format!(
                "sync halted at superstep {superstep} but this worker already finished superstep {finished}"
            ))),
            ControlEvent::Abort => Err(IterdagError::Disconnected(
                "job aborted by another worker".to_string(),
            )),
        }
    }
}
