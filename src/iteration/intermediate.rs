// src/iteration/intermediate.rs

//! Joins the per-superstep working set against the static companion input.
//!
//! The companion input is only delivered during superstep 0; it is retained
//! in a [`ReplayBuffer`] and probed again on every later superstep.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{EdgeSender, InputGate};
use crate::errors::{IterdagError, Result};
use crate::iteration::{ReplayBuffer, WorkerContext};
use crate::record::{KeyLayout, Record};
use crate::stage::MatchStage;
use crate::sync::Control;
use crate::types::Superstep;

#[derive(Debug)]
pub struct IntermediateWorker {
    pub ctx: WorkerContext,
    pub stage: Arc<dyn MatchStage>,
    pub keys: KeyLayout,
    pub memory_budget: usize,
    pub working: InputGate,
    pub companion: Option<InputGate>,
    pub to_tail: EdgeSender,
}

impl IntermediateWorker {
    pub async fn run(mut self) -> Result<()> {
        let partition = self.ctx.partition;
        let mut replay: Option<ReplayBuffer> = None;
        let mut superstep: Superstep = 0;

        loop {
            let working = match (superstep, self.companion.take()) {
                (0, Some(mut companion_gate)) => {
                    let (working, companion) = tokio::try_join!(
                        self.working.collect(0),
                        companion_gate.collect(0)
                    )?;
                    replay = Some(self.retain(companion)?);
                    working
                }
                _ => self.working.collect(superstep).await?,
            };

            let buffer = replay.as_ref().ok_or_else(|| {
                IterdagError::BarrierMismatch(format!(
                    "intermediate partition {partition}: companion input missing at superstep {superstep}"
                ))
            })?;

            let emitted = self.join_and_emit(&working, buffer).await?;
            self.to_tail.end_superstep(superstep).await?;

            debug!(
                partition,
                superstep,
                working = working.len(),
                emitted,
                "intermediate: superstep done"
            );

            match self.ctx.control.after(superstep).await? {
                Control::Next(next) => superstep = next,
                Control::Halt => break,
            }
        }

        info!(partition, superstep, "intermediate: finished");
        Ok(())
    }

    fn retain(&self, companion: Vec<Record>) -> Result<ReplayBuffer> {
        let buffer = ReplayBuffer::build(companion, self.keys.companion)?;
        if buffer.estimated_bytes() > self.memory_budget {
            warn!(
                partition = self.ctx.partition,
                bytes = buffer.estimated_bytes(),
                budget = self.memory_budget,
                "intermediate: retained companion input exceeds the partition memory budget"
            );
        }
        debug!(
            partition = self.ctx.partition,
            records = buffer.len(),
            keys = buffer.distinct_keys(),
            "intermediate: companion input retained for replay"
        );
        Ok(buffer)
    }

    /// Probe the replay buffer with every working-set record, in gate order.
    async fn join_and_emit(&self, working: &[Record], buffer: &ReplayBuffer) -> Result<usize> {
        let mut out = Vec::new();
        let mut emitted = 0;

        for record in working {
            let key = record.key(self.keys.state)?;
            for companion in buffer.matches(&key) {
                self.stage.join(record, companion, &mut out)?;
            }
            emitted += out.len();
            self.to_tail.send_all(out.drain(..)).await?;
        }

        Ok(emitted)
    }
}
