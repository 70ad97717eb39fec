// src/iteration/head.rs

//! Entry point of the cycle.
//!
//! Superstep 0 reads the seed split; every later superstep reads the state
//! Tail left in this partition's backchannel. The Head keeps nothing across
//! supersteps except the broadcast transition set, which is read once.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::{EdgeSender, InputGate};
use crate::errors::Result;
use crate::iteration::{BackchannelReader, WorkerContext};
use crate::record::Record;
use crate::stage::MapStage;
use crate::sync::{BarrierSignal, Control};
use crate::types::Superstep;

#[derive(Debug)]
pub struct HeadWorker {
    pub ctx: WorkerContext,
    pub stage: Arc<dyn MapStage>,
    pub seed: InputGate,
    pub transition: Option<InputGate>,
    pub backchannel: BackchannelReader,
    pub to_intermediate: EdgeSender,
    pub to_delta: EdgeSender,
    pub to_output: EdgeSender,
}

impl HeadWorker {
    pub async fn run(mut self) -> Result<()> {
        let partition = self.ctx.partition;

        let companion = match self.transition.take() {
            Some(mut gate) => gate.collect(0).await?,
            None => Vec::new(),
        };
        if !companion.is_empty() {
            debug!(partition, records = companion.len(), "head: transition input retained");
        }

        let mut superstep: Superstep = 0;
        loop {
            let state = self.read_state(superstep).await?;
            self.ctx.probe.head_read(partition, superstep, &state);

            let mut working = Vec::with_capacity(state.len());
            for record in state {
                self.stage.map(record, &companion, &mut working)?;
            }
            let records = working.len();

            debug!(partition, superstep, records, "head: emitting working set");
            self.emit(superstep, working).await?;

            self.ctx
                .signal(BarrierSignal::HeadState {
                    partition,
                    superstep,
                    records,
                })
                .await?;

            match self.ctx.control.after(superstep).await? {
                Control::Next(next) => superstep = next,
                Control::Halt => break,
            }
        }

        info!(partition, superstep, "head: finished");
        Ok(())
    }

    async fn read_state(&mut self, superstep: Superstep) -> Result<Vec<Record>> {
        if superstep == 0 {
            return self.seed.collect(0).await;
        }
        let frame = self.backchannel.read(superstep).await?;
        Ok(frame.to_vec())
    }

    async fn emit(&self, superstep: Superstep, working: Vec<Record>) -> Result<()> {
        self.to_intermediate.send_all(working.iter().cloned()).await?;
        self.to_intermediate.end_superstep(superstep).await?;

        self.to_delta.send_all(working.iter().cloned()).await?;
        self.to_delta.end_superstep(superstep).await?;

        self.to_output.send_all(working).await?;
        self.to_output.end_superstep(superstep).await
    }
}
