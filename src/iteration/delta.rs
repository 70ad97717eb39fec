// src/iteration/delta.rs

//! Compares the state a superstep started from (broadcast by Head) with the
//! state Tail produced, and reports the summed absolute change to Sync.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::InputGate;
use crate::errors::Result;
use crate::iteration::{ReplayBuffer, WorkerContext};
use crate::record::KeyLayout;
use crate::stage::DeltaStage;
use crate::sync::{BarrierSignal, Control};
use crate::types::Superstep;

#[derive(Debug)]
pub struct DeltaWorker {
    pub ctx: WorkerContext,
    pub stage: Arc<dyn DeltaStage>,
    pub keys: KeyLayout,
    pub from_head: InputGate,
    pub from_tail: InputGate,
}

impl DeltaWorker {
    pub async fn run(mut self) -> Result<()> {
        let partition = self.ctx.partition;
        let mut superstep: Superstep = 0;

        loop {
            let (previous, current) = tokio::try_join!(
                self.from_head.collect(superstep),
                self.from_tail.collect(superstep)
            )?;

            let previous = ReplayBuffer::build(previous, self.keys.state)?;
            let mut statistic = 0.0;
            let mut matched = 0usize;
            for record in &current {
                let key = record.key(self.keys.state)?;
                for old in previous.matches(&key) {
                    statistic += self.stage.delta(old, record)?.abs();
                    matched += 1;
                }
            }

            debug!(
                partition,
                superstep,
                current = current.len(),
                matched,
                statistic,
                "delta path: superstep compared"
            );

            self.ctx
                .signal(BarrierSignal::Delta {
                    partition,
                    superstep,
                    statistic,
                })
                .await?;

            match self.ctx.control.after(superstep).await? {
                Control::Next(next) => superstep = next,
                Control::Halt => break,
            }
        }

        info!(partition, superstep, "delta path: finished");
        Ok(())
    }
}
