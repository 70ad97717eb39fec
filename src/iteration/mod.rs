// src/iteration/mod.rs

//! The roles of the iteration cycle.
//!
//! ```text
//! seed ──► Head ──► Intermediate ──► Tail ──► DeltaPath ──► Sync
//!           ▲  │         ▲              │         ▲
//!           │  ├─────────┼──────────────┼─────────┘
//!           │  └──► Output              │
//!           └───── Backchannel ◄────────┘
//! ```
//!
//! Every role runs one long-lived worker per partition. Between supersteps a
//! worker blocks on [`crate::sync::ControlReceiver::after`]; nothing else
//! coordinates workers.

pub mod backchannel;
pub mod delta;
pub mod head;
pub mod intermediate;
pub mod output;
pub mod probe;
pub mod replay;
pub mod source;
pub mod tail;

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::errors::{IterdagError, Result};
use crate::sync::{BarrierSignal, ControlReceiver, SyncSignal};
use crate::types::{PartitionId, Role};

pub use backchannel::{backchannel, BackchannelReader, BackchannelWriter};
pub use delta::DeltaWorker;
pub use head::HeadWorker;
pub use intermediate::IntermediateWorker;
pub use output::OutputWorker;
pub use probe::{IterationProbe, NoopProbe};
pub use replay::ReplayBuffer;
pub use source::SourceWorker;
pub use tail::TailWorker;

/// What every cycle worker needs besides its data edges.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pub role: Role,
    pub partition: PartitionId,
    pub signals: mpsc::Sender<SyncSignal>,
    pub control: ControlReceiver,
    pub probe: Arc<dyn IterationProbe>,
}

/// Run file work (spills, merges, sink writes, source reads) on tokio's
/// blocking pool instead of an async worker thread. The task starts at once;
/// the returned future only waits for it.
pub(crate) fn run_blocking<T, F>(f: F) -> impl Future<Output = Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let handle = tokio::task::spawn_blocking(f);
    async move {
        handle
            .await
            .map_err(|join_err| IterdagError::Other(join_err.into()))?
    }
}

impl WorkerContext {
    pub async fn signal(&self, signal: BarrierSignal) -> Result<()> {
        self.signals
            .send(SyncSignal::Barrier(signal))
            .await
            .map_err(|_| {
                IterdagError::Disconnected(format!(
                    "{} partition {}: sync is gone",
                    self.role, self.partition
                ))
            })
    }
}
