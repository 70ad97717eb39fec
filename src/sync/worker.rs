// src/sync/worker.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::errors::{IterdagError, Result};
use crate::types::Superstep;

use super::barrier::{Barrier, BarrierState, Decision, TerminationReason};
use super::criterion::ConvergenceCriterion;
use super::{ControlEvent, SyncSignal};

/// How the iteration ended.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// Last superstep that ran.
    pub final_superstep: Superstep,
    pub reason: TerminationReason,
    /// Aggregated delta statistic per superstep.
    pub statistics: Vec<f64>,
}

/// IO shell around [`Barrier`]: reads signals, publishes control events.
pub struct SyncWorker {
    barrier: Barrier,
    criterion: Arc<dyn ConvergenceCriterion>,
    signals: mpsc::Receiver<SyncSignal>,
    control: watch::Sender<ControlEvent>,
}

impl fmt::Debug for SyncWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncWorker")
            .field("barrier", &self.barrier)
            .finish_non_exhaustive()
    }
}

impl SyncWorker {
    pub fn new(
        barrier: Barrier,
        criterion: Arc<dyn ConvergenceCriterion>,
        signals: mpsc::Receiver<SyncSignal>,
        control: watch::Sender<ControlEvent>,
    ) -> Self {
        Self {
            barrier,
            criterion,
            signals,
            control,
        }
    }

    /// Main loop. Returns once the barrier terminates, or with the root-cause
    /// error when any worker aborts.
    pub async fn run(mut self) -> Result<SyncOutcome> {
        info!("sync started");

        loop {
            if let BarrierState::Evaluating(_) = self.barrier.state() {
                let decision = match self.barrier.evaluate(self.criterion.as_ref()) {
                    Ok(decision) => decision,
                    Err(err) => return Err(self.abort(err).await),
                };

                match decision {
                    Decision::Continue { next, .. } => {
                        self.control.send_replace(ControlEvent::Proceed(next));
                        if let Err(err) = self.barrier.begin_next() {
                            return Err(self.abort(err).await);
                        }
                        continue;
                    }
                    Decision::Terminate {
                        superstep, reason, ..
                    } => {
                        info!(superstep, ?reason, "sync: terminating iteration");
                        self.control.send_replace(ControlEvent::Halt { superstep });
                        return Ok(SyncOutcome {
                            final_superstep: superstep,
                            reason,
                            statistics: self.barrier.statistics().to_vec(),
                        });
                    }
                }
            }

            let signal = match self.signals.recv().await {
                Some(signal) => signal,
                None => {
                    let err = IterdagError::Disconnected(format!(
                        "all workers went away while sync was {:?}",
                        self.barrier.state()
                    ));
                    return Err(self.abort(err).await);
                }
            };

            match signal {
                SyncSignal::Barrier(signal) => {
                    debug!(?signal, "sync received signal");
                    if let Err(err) = self.barrier.offer(signal) {
                        return Err(self.abort(err).await);
                    }
                }
                SyncSignal::Abort {
                    role,
                    partition,
                    error,
                } => {
                    error!(%role, partition, error = %error, "worker aborted");
                    return Err(self.abort(error.in_stage(role, partition)).await);
                }
            }
        }
    }

    /// Tell every worker to stop, then wait for the remaining signals so the
    /// root cause can be told apart from follow-on disconnects.
    async fn abort(&mut self, first: IterdagError) -> IterdagError {
        self.control.send_replace(ControlEvent::Abort);

        let mut root = first;
        while let Some(signal) = self.signals.recv().await {
            if let SyncSignal::Abort {
                role,
                partition,
                error,
            } = signal
            {
                debug!(%role, partition, error = %error, "follow-on abort");
                if root.is_secondary() && !error.is_secondary() {
                    root = error.in_stage(role, partition);
                }
            }
        }

        root
    }
}
