// src/sync/barrier.rs

//! Pure barrier / termination state machine.
//!
//! Driven only by counted signals: one "current state" signal per Head
//! partition and one "delta" signal per delta-path partition, all tagged with
//! the superstep they belong to. No Tokio, channels or clocks, so every
//! transition can be unit tested directly.
//!
//! ```text
//! AwaitingSignals(s) --all signals--> Evaluating(s) --+--> Continuing(s+1) --begin_next--> AwaitingSignals(s+1)
//!                                                     '--> Terminated
//! ```

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::errors::{IterdagError, Result};
use crate::sync::criterion::ConvergenceCriterion;
use crate::types::{PartitionId, Superstep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierState {
    AwaitingSignals(Superstep),
    Evaluating(Superstep),
    Continuing(Superstep),
    Terminated,
}

/// A signal counted by the barrier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BarrierSignal {
    /// A Head partition forwarded its working set for `superstep`.
    HeadState {
        partition: PartitionId,
        superstep: Superstep,
        records: usize,
    },
    /// A delta-path partition finished comparing old and new state.
    Delta {
        partition: PartitionId,
        superstep: Superstep,
        statistic: f64,
    },
}

impl BarrierSignal {
    pub fn superstep(&self) -> Superstep {
        match self {
            BarrierSignal::HeadState { superstep, .. } | BarrierSignal::Delta { superstep, .. } => {
                *superstep
            }
        }
    }
}

/// Result of offering a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierStep {
    /// Counted for the current superstep; more signals are needed.
    Waiting,
    /// Tagged with the next superstep; held back until it begins.
    Buffered,
    /// All signals for this superstep are in; the barrier is evaluating.
    Ready(Superstep),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    Converged(Option<String>),
    IterationCap,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Continue {
        next: Superstep,
        statistic: f64,
    },
    Terminate {
        superstep: Superstep,
        statistic: f64,
        reason: TerminationReason,
    },
}

#[derive(Debug, Default, Clone)]
struct SignalCounts {
    heads: BTreeMap<PartitionId, usize>,
    deltas: BTreeMap<PartitionId, f64>,
}

impl SignalCounts {
    fn clear(&mut self) {
        self.heads.clear();
        self.deltas.clear();
    }
}

#[derive(Debug)]
pub struct Barrier {
    head_partitions: usize,
    delta_partitions: usize,
    max_supersteps: Superstep,
    state: BarrierState,
    current: SignalCounts,
    early: SignalCounts,
    statistics: Vec<f64>,
}

impl Barrier {
    pub fn new(head_partitions: usize, delta_partitions: usize, max_supersteps: Superstep) -> Self {
        Self {
            head_partitions,
            delta_partitions,
            max_supersteps,
            state: BarrierState::AwaitingSignals(0),
            current: SignalCounts::default(),
            early: SignalCounts::default(),
            statistics: Vec::new(),
        }
    }

    pub fn state(&self) -> BarrierState {
        self.state
    }

    /// Aggregated delta statistic of every evaluated superstep, in order.
    pub fn statistics(&self) -> &[f64] {
        &self.statistics
    }

    /// Number of signals held back for the next superstep.
    pub fn buffered_signals(&self) -> usize {
        self.early.heads.len() + self.early.deltas.len()
    }

    /// Number of signals counted towards the current superstep.
    pub fn counted_signals(&self) -> usize {
        self.current.heads.len() + self.current.deltas.len()
    }

    pub fn offer(&mut self, signal: BarrierSignal) -> Result<BarrierStep> {
        let tag = signal.superstep();

        let (current, next) = match self.state {
            BarrierState::AwaitingSignals(s) => (Some(s), s + 1),
            BarrierState::Continuing(next) => (None, next),
            BarrierState::Evaluating(s) => {
                return Err(mismatch(format!(
                    "signal for superstep {tag} arrived while evaluating superstep {s}"
                )));
            }
            BarrierState::Terminated => {
                return Err(mismatch(format!(
                    "signal for superstep {tag} arrived after termination"
                )));
            }
        };

        if Some(tag) == current {
            self.count(signal, false)?;
            if self.current_complete() {
                self.state = BarrierState::Evaluating(tag);
                debug!(superstep = tag, "barrier: all signals received");
                return Ok(BarrierStep::Ready(tag));
            }
            return Ok(BarrierStep::Waiting);
        }

        if tag == next {
            self.count(signal, true)?;
            debug!(
                superstep = tag,
                buffered = self.buffered_signals(),
                "barrier: buffering signal for next superstep"
            );
            return Ok(BarrierStep::Buffered);
        }

        Err(mismatch(format!(
            "signal tagged with superstep {tag} while barrier is {:?}",
            self.state
        )))
    }

    /// Run the criterion for the superstep whose signals are complete.
    pub fn evaluate(&mut self, criterion: &dyn ConvergenceCriterion) -> Result<Decision> {
        let superstep = match self.state {
            BarrierState::Evaluating(s) => s,
            other => {
                return Err(mismatch(format!("evaluate called while barrier is {other:?}")));
            }
        };

        // Summed in partition order so the statistic is reproducible.
        let statistic: f64 = self.current.deltas.values().sum();
        let state_records: usize = self.current.heads.values().sum();
        self.statistics.push(statistic);

        let verdict = match criterion.evaluate(statistic, superstep) {
            Ok(verdict) => verdict,
            Err(err) => {
                warn!(
                    superstep,
                    statistic,
                    error = %err,
                    "convergence criterion failed; treating as not converged"
                );
                crate::types::ConvergenceVerdict::not_converged()
            }
        };

        info!(
            superstep,
            statistic,
            state_records,
            converged = verdict.converged,
            "barrier: superstep evaluated"
        );

        if verdict.converged {
            self.state = BarrierState::Terminated;
            return Ok(Decision::Terminate {
                superstep,
                statistic,
                reason: TerminationReason::Converged(verdict.reason),
            });
        }

        if superstep + 1 > self.max_supersteps {
            self.state = BarrierState::Terminated;
            return Ok(Decision::Terminate {
                superstep,
                statistic,
                reason: TerminationReason::IterationCap,
            });
        }

        self.current.clear();
        self.state = BarrierState::Continuing(superstep + 1);
        Ok(Decision::Continue {
            next: superstep + 1,
            statistic,
        })
    }

    /// Enter the next superstep after the proceed event went out. Signals that
    /// were buffered for it are counted now.
    pub fn begin_next(&mut self) -> Result<BarrierStep> {
        let next = match self.state {
            BarrierState::Continuing(next) => next,
            other => {
                return Err(mismatch(format!("begin_next called while barrier is {other:?}")));
            }
        };

        self.current = std::mem::take(&mut self.early);
        self.state = BarrierState::AwaitingSignals(next);

        if self.current_complete() {
            self.state = BarrierState::Evaluating(next);
            return Ok(BarrierStep::Ready(next));
        }
        Ok(BarrierStep::Waiting)
    }

    fn count(&mut self, signal: BarrierSignal, early: bool) -> Result<()> {
        let (head_partitions, delta_partitions) = (self.head_partitions, self.delta_partitions);
        let counts = if early { &mut self.early } else { &mut self.current };

        match signal {
            BarrierSignal::HeadState {
                partition,
                superstep,
                records,
            } => {
                if partition >= head_partitions {
                    return Err(mismatch(format!(
                        "head signal from unknown partition {partition} (superstep {superstep})"
                    )));
                }
                if counts.heads.insert(partition, records).is_some() {
                    return Err(mismatch(format!(
                        "duplicate head signal from partition {partition} for superstep {superstep}"
                    )));
                }
            }
            BarrierSignal::Delta {
                partition,
                superstep,
                statistic,
            } => {
                if partition >= delta_partitions {
                    return Err(mismatch(format!(
                        "delta signal from unknown partition {partition} (superstep {superstep})"
                    )));
                }
                if counts.deltas.insert(partition, statistic).is_some() {
                    return Err(mismatch(format!(
                        "duplicate delta signal from partition {partition} for superstep {superstep}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn current_complete(&self) -> bool {
        self.current.heads.len() == self.head_partitions
            && self.current.deltas.len() == self.delta_partitions
    }
}

fn mismatch(msg: String) -> IterdagError {
    IterdagError::BarrierMismatch(msg)
}
