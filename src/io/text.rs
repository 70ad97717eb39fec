// src/io/text.rs

//! Whitespace-separated text files, one record per line.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::Result;
use crate::fs::{FileSystem, RealFileSystem};
use crate::io::{take_split, RecordSink, RecordSource};
use crate::record::format::{format_record, parse_records};
use crate::record::Record;
use crate::types::PartitionId;

/// Reads one text file; each partition gets every `splits`-th record.
#[derive(Debug, Clone)]
pub struct TextFileSource {
    path: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl TextFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_fs(path, Arc::new(RealFileSystem))
    }

    pub fn with_fs(path: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            path: path.into(),
            fs,
        }
    }
}

impl RecordSource for TextFileSource {
    fn read_split(&self, split: usize, splits: usize) -> Result<Vec<Record>> {
        let contents = self.fs.read_to_string(&self.path)?;
        let records = parse_records(&contents)?;
        let split_records = take_split(records, split, splits);
        debug!(
            path = %self.path.display(),
            split,
            splits,
            records = split_records.len(),
            "read input split"
        );
        Ok(split_records)
    }
}

/// Writes partition `p` to `<dir>/part-<p>`.
#[derive(Debug, Clone)]
pub struct TextDirSink {
    dir: PathBuf,
    fs: Arc<dyn FileSystem>,
}

impl TextDirSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_fs(dir, Arc::new(RealFileSystem))
    }

    pub fn with_fs(dir: impl Into<PathBuf>, fs: Arc<dyn FileSystem>) -> Self {
        Self { dir: dir.into(), fs }
    }

    pub fn partition_path(&self, partition: PartitionId) -> PathBuf {
        self.dir.join(format!("part-{partition:05}"))
    }
}

impl RecordSink for TextDirSink {
    fn write_partition(&self, partition: PartitionId, records: &[Record]) -> Result<()> {
        let mut contents = String::new();
        for record in records {
            contents.push_str(&format_record(record));
            contents.push('\n');
        }

        let path = self.partition_path(partition);
        self.fs.write(&path, contents.as_bytes())?;
        info!(
            path = %path.display(),
            records = records.len(),
            "wrote final output partition"
        );
        Ok(())
    }
}
