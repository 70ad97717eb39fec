// src/sort/merge.rs

//! Reading spilled runs back and merging them.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use crate::errors::{IterdagError, Result};
use crate::record::{Key, Record};

/// Sequential reader over one sorted run file.
pub(super) struct RunReader {
    path: PathBuf,
    lines: Lines<BufReader<File>>,
    key_field: usize,
}

impl RunReader {
    pub(super) fn open(path: &Path, key_field: usize) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| IterdagError::SpillFailed(format!("{}: {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            lines: BufReader::new(file).lines(),
            key_field,
        })
    }
}

impl Iterator for RunReader {
    type Item = Result<(Key, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        let line = match self.lines.next()? {
            Ok(line) => line,
            Err(e) => {
                return Some(Err(IterdagError::SpillFailed(format!(
                    "{}: {e}",
                    self.path.display()
                ))));
            }
        };

        let parsed = serde_json::from_str::<Record>(&line)
            .map_err(|e| IterdagError::SpillFailed(format!("{}: {e}", self.path.display())))
            .and_then(|record| Ok((record.key(self.key_field)?, record)));
        Some(parsed)
    }
}

struct HeapEntry {
    key: Key,
    run: usize,
    record: Record,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.run == other.run
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    // Ties on key resolve by run index, so equal keys keep run order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.run.cmp(&other.run))
    }
}

/// K-way merge over sorted runs; one open handle per run.
pub(super) struct KWayMerge {
    readers: Vec<RunReader>,
    heap: BinaryHeap<Reverse<HeapEntry>>,
}

impl KWayMerge {
    pub(super) fn new(mut readers: Vec<RunReader>) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(readers.len());
        for (run, reader) in readers.iter_mut().enumerate() {
            if let Some(item) = reader.next() {
                let (key, record) = item?;
                heap.push(Reverse(HeapEntry { key, run, record }));
            }
        }
        Ok(Self { readers, heap })
    }
}

impl Iterator for KWayMerge {
    type Item = Result<(Key, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        let Reverse(entry) = self.heap.pop()?;

        if let Some(item) = self.readers[entry.run].next() {
            match item {
                Ok((key, record)) => self.heap.push(Reverse(HeapEntry {
                    key,
                    run: entry.run,
                    record,
                })),
                Err(e) => return Some(Err(e)),
            }
        }

        Some(Ok((entry.key, entry.record)))
    }
}
