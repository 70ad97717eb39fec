// src/iteration/output.rs

//! Final-output collector.
//!
//! Head forwards its working set every superstep. Only the copy from the
//! superstep the job halts on is written, so each partition keeps a single
//! slot that the next superstep overwrites.

use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::InputGate;
use crate::errors::Result;
use crate::io::RecordSink;
use crate::iteration::{run_blocking, WorkerContext};
use crate::sync::Control;
use crate::types::Superstep;

#[derive(Debug)]
pub struct OutputWorker {
    pub ctx: WorkerContext,
    pub from_head: InputGate,
    pub sink: Arc<dyn RecordSink>,
}

impl OutputWorker {
    pub async fn run(mut self) -> Result<()> {
        let partition = self.ctx.partition;
        let mut superstep: Superstep = 0;

        let latest = loop {
            let copy = self.from_head.collect(superstep).await?;
            debug!(partition, superstep, records = copy.len(), "output: slot replaced");

            match self.ctx.control.after(superstep).await? {
                Control::Next(next) => superstep = next,
                Control::Halt => break copy,
            }
        };

        let records = latest.len();
        let sink = Arc::clone(&self.sink);
        run_blocking(move || sink.write_partition(partition, &latest)).await?;
        info!(partition, superstep, records, "output: finalised");
        Ok(())
    }
}
