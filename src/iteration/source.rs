// src/iteration/source.rs

use std::sync::Arc;

use tracing::debug;

use crate::channel::EdgeSender;
use crate::errors::Result;
use crate::io::RecordSource;
use crate::iteration::run_blocking;
use crate::types::{PartitionId, Role};

/// Reads one split of an external input and ships it during superstep 0.
#[derive(Debug)]
pub struct SourceWorker {
    pub role: Role,
    pub partition: PartitionId,
    pub splits: usize,
    pub source: Arc<dyn RecordSource>,
    pub out: EdgeSender,
}

impl SourceWorker {
    pub async fn run(self) -> Result<()> {
        let source = Arc::clone(&self.source);
        let (split, splits) = (self.partition, self.splits);
        let records = run_blocking(move || source.read_split(split, splits)).await?;
        debug!(
            role = %self.role,
            partition = self.partition,
            records = records.len(),
            edge = self.out.spec().name,
            "source: shipping split"
        );
        self.out.send_all(records).await?;
        self.out.end_superstep(0).await
    }
}
