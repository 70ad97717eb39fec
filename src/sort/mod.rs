// src/sort/mod.rs

//! Memory-bounded grouping for the Tail stage.
//!
//! Records are buffered until the partition memory budget is reached, then
//! sorted by key and spilled to a run file (JSON lines) in a temporary
//! directory. [`SpillingSorter::finish`] merges the runs with a fan-in of at
//! most `max_file_handles`, running intermediate merge passes when there are
//! more runs than handles, and yields one group per key in key order.

mod merge;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::iter::Peekable;
use std::path::PathBuf;

use tempfile::TempDir;
use tracing::debug;

use crate::errors::{IterdagError, Result};
use crate::record::{Key, Record};

use merge::{KWayMerge, RunReader};

/// Counters describing how a sort went.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    pub records: usize,
    pub spilled_runs: usize,
    pub merge_passes: usize,
}

#[derive(Debug)]
pub struct SpillingSorter {
    key_field: usize,
    memory_budget: usize,
    max_file_handles: usize,
    buffer: Vec<(Key, Record)>,
    buffered_bytes: usize,
    runs: Vec<PathBuf>,
    spill_dir: Option<TempDir>,
    next_run_id: usize,
    stats: SortStats,
}

impl SpillingSorter {
    pub fn new(key_field: usize, memory_budget: usize, max_file_handles: usize) -> Self {
        Self {
            key_field,
            memory_budget: memory_budget.max(1),
            max_file_handles: max_file_handles.max(2),
            buffer: Vec::new(),
            buffered_bytes: 0,
            runs: Vec::new(),
            spill_dir: None,
            next_run_id: 0,
            stats: SortStats::default(),
        }
    }

    pub fn push(&mut self, record: Record) -> Result<()> {
        let key = record.key(self.key_field)?;
        let size = record.estimated_size();

        if !self.buffer.is_empty() && self.buffered_bytes + size > self.memory_budget {
            self.spill()?;
        }

        self.buffered_bytes += size;
        self.buffer.push((key, record));
        self.stats.records += 1;
        Ok(())
    }

    pub fn stats(&self) -> SortStats {
        self.stats
    }

    /// Sort everything pushed so far and return the key groups.
    pub fn finish(mut self) -> Result<SortedGroups> {
        if self.runs.is_empty() {
            let mut buffer = std::mem::take(&mut self.buffer);
            buffer.sort_by(|a, b| a.0.cmp(&b.0));
            let source: Box<dyn Iterator<Item = Result<(Key, Record)>> + Send> =
                Box::new(buffer.into_iter().map(Ok));
            return Ok(SortedGroups {
                source: source.peekable(),
                stats: self.stats,
                _spill_dir: None,
            });
        }

        if !self.buffer.is_empty() {
            self.spill()?;
        }

        while self.runs.len() > self.max_file_handles {
            self.merge_pass()?;
        }

        let readers = self
            .runs
            .iter()
            .map(|path| RunReader::open(path, self.key_field))
            .collect::<Result<Vec<_>>>()?;
        let source: Box<dyn Iterator<Item = Result<(Key, Record)>> + Send> =
            Box::new(KWayMerge::new(readers)?);

        debug!(
            runs = self.runs.len(),
            merge_passes = self.stats.merge_passes,
            "final merge of spilled runs"
        );

        Ok(SortedGroups {
            source: source.peekable(),
            stats: self.stats,
            _spill_dir: self.spill_dir.take(),
        })
    }

    fn spill(&mut self) -> Result<()> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.sort_by(|a, b| a.0.cmp(&b.0));

        let path = self.new_run_path()?;
        write_run(&path, buffer.iter().map(|(_, r)| r))?;

        debug!(
            run = %path.display(),
            records = buffer.len(),
            bytes = self.buffered_bytes,
            "spilled sorted run"
        );

        self.runs.push(path);
        self.buffered_bytes = 0;
        self.stats.spilled_runs += 1;
        Ok(())
    }

    /// Merge the oldest `max_file_handles` runs into one.
    fn merge_pass(&mut self) -> Result<()> {
        let inputs: Vec<PathBuf> = self.runs.drain(..self.max_file_handles).collect();
        let readers = inputs
            .iter()
            .map(|path| RunReader::open(path, self.key_field))
            .collect::<Result<Vec<_>>>()?;

        let path = self.new_run_path()?;
        let merged = KWayMerge::new(readers)?;
        let file = File::create(&path).map_err(|e| spill_error(&path, e))?;
        let mut out = BufWriter::new(file);
        for item in merged {
            let (_, record) = item?;
            write_line(&mut out, &path, &record)?;
        }
        out.flush().map_err(|e| spill_error(&path, e))?;

        for input in &inputs {
            // Best effort: the temp dir is removed on drop anyway.
            let _ = std::fs::remove_file(input);
        }

        self.runs.push(path);
        self.stats.merge_passes += 1;
        Ok(())
    }

    fn new_run_path(&mut self) -> Result<PathBuf> {
        if self.spill_dir.is_none() {
            let dir = tempfile::Builder::new()
                .prefix("iterdag-spill-")
                .tempdir()
                .map_err(|e| IterdagError::SpillFailed(format!("creating spill directory: {e}")))?;
            self.spill_dir = Some(dir);
        }
        let dir = self
            .spill_dir
            .as_ref()
            .map(|d| d.path().to_path_buf())
            .unwrap_or_default();
        let path = dir.join(format!("run-{:05}.jsonl", self.next_run_id));
        self.next_run_id += 1;
        Ok(path)
    }
}

fn write_run<'a>(path: &PathBuf, records: impl Iterator<Item = &'a Record>) -> Result<()> {
    let file = File::create(path).map_err(|e| spill_error(path, e))?;
    let mut out = BufWriter::new(file);
    for record in records {
        write_line(&mut out, path, record)?;
    }
    out.flush().map_err(|e| spill_error(path, e))
}

fn write_line(out: &mut BufWriter<File>, path: &PathBuf, record: &Record) -> Result<()> {
    serde_json::to_writer(&mut *out, record)
        .map_err(|e| IterdagError::SpillFailed(format!("{}: {e}", path.display())))?;
    out.write_all(b"\n").map_err(|e| spill_error(path, e))
}

fn spill_error(path: &PathBuf, err: std::io::Error) -> IterdagError {
    IterdagError::SpillFailed(format!("{}: {err}", path.display()))
}

/// Key groups in ascending key order.
pub struct SortedGroups {
    source: Peekable<Box<dyn Iterator<Item = Result<(Key, Record)>> + Send>>,
    stats: SortStats,
    _spill_dir: Option<TempDir>,
}

impl SortedGroups {
    pub fn stats(&self) -> SortStats {
        self.stats
    }
}

impl Iterator for SortedGroups {
    type Item = Result<(Key, Vec<Record>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let (key, first) = match self.source.next()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };

        let mut group = vec![first];
        while let Some(Ok((next_key, _))) = self.source.peek() {
            if *next_key != key {
                break;
            }
            if let Some(Ok((_, record))) = self.source.next() {
                group.push(record);
            }
        }

        Some(Ok((key, group)))
    }
}
