// src/iteration/tail.rs

//! Last stage of the cycle: group partial results by key, aggregate, and
//! close the loop through the backchannel.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{EdgeSender, InputGate};
use crate::errors::{IterdagError, Result};
use crate::iteration::{run_blocking, BackchannelWriter, WorkerContext};
use crate::record::{KeyLayout, Record};
use crate::sort::{SortStats, SpillingSorter};
use crate::stage::ReduceStage;
use crate::sync::Control;
use crate::types::Superstep;

#[derive(Debug)]
pub struct TailWorker {
    pub ctx: WorkerContext,
    pub stage: Arc<dyn ReduceStage>,
    pub keys: KeyLayout,
    pub memory_budget: usize,
    pub max_file_handles: usize,
    pub input: InputGate,
    pub backchannel: BackchannelWriter,
    pub to_delta: EdgeSender,
}

impl TailWorker {
    pub async fn run(mut self) -> Result<()> {
        let partition = self.ctx.partition;
        let mut superstep: Superstep = 0;

        loop {
            let aggregated = self.aggregate(superstep).await?;

            self.ctx
                .probe
                .backchannel_write(partition, superstep + 1, &aggregated);
            self.backchannel.write(superstep + 1, aggregated.clone())?;

            self.to_delta.send_all(aggregated).await?;
            self.to_delta.end_superstep(superstep).await?;

            match self.ctx.control.after(superstep).await? {
                Control::Next(next) => superstep = next,
                Control::Halt => break,
            }
        }

        info!(partition, superstep, "tail: finished");
        Ok(())
    }

    /// Stream the superstep's input into a spilling sorter running on the
    /// blocking pool, then reduce each key group there. Output is in key
    /// order.
    async fn aggregate(&mut self, superstep: Superstep) -> Result<Vec<Record>> {
        let sorter =
            SpillingSorter::new(self.keys.partial, self.memory_budget, self.max_file_handles);
        let (feed, records) = mpsc::channel(SORT_FEED_CAPACITY);
        let stage = Arc::clone(&self.stage);
        let keys = self.keys;
        let sorting = run_blocking(move || sort_and_reduce(sorter, records, stage.as_ref(), keys));

        while let Some(record) = self.input.next(superstep).await? {
            if feed.send(record).await.is_err() {
                // The sorter gave up; its error is returned below.
                break;
            }
        }
        drop(feed);

        let (aggregated, stats) = sorting.await?;
        self.ctx.probe.tail_sorted(self.ctx.partition, superstep, stats);

        debug!(
            partition = self.ctx.partition,
            superstep,
            inputs = stats.records,
            keys = aggregated.len(),
            spilled_runs = stats.spilled_runs,
            merge_passes = stats.merge_passes,
            "tail: superstep aggregated"
        );

        Ok(aggregated)
    }
}

const SORT_FEED_CAPACITY: usize = 1024;

fn sort_and_reduce(
    mut sorter: SpillingSorter,
    mut records: mpsc::Receiver<Record>,
    stage: &dyn ReduceStage,
    keys: KeyLayout,
) -> Result<(Vec<Record>, SortStats)> {
    while let Some(record) = records.blocking_recv() {
        sorter.push(record)?;
    }

    let groups = sorter.finish()?;
    let stats = groups.stats();

    let mut aggregated = Vec::new();
    for group in groups {
        let (key, records) = group?;
        let record = stage.reduce(&key, records)?;
        let produced = record.key(keys.state)?;
        if produced != key {
            return Err(IterdagError::MalformedRecord(format!(
                "reduce for key {key} produced a record keyed {produced}"
            )));
        }
        aggregated.push(record);
    }
    Ok((aggregated, stats))
}
