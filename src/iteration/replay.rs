// src/iteration/replay.rs

//! Retained copy of the static companion input.
//!
//! Populated once during superstep 0 and only read afterwards: the source is
//! not re-delivered on later supersteps.

use std::collections::BTreeMap;

use crate::errors::Result;
use crate::record::{Key, Record};

#[derive(Debug, Default)]
pub struct ReplayBuffer {
    arena: Vec<Record>,
    index: BTreeMap<Key, Vec<usize>>,
    bytes: usize,
}

impl ReplayBuffer {
    /// Retain `records`, indexing them by the field at `key_field`.
    pub fn build(records: Vec<Record>, key_field: usize) -> Result<Self> {
        let mut buffer = Self::default();
        for record in records {
            let key = record.key(key_field)?;
            buffer.bytes += record.estimated_size();
            buffer.index.entry(key).or_default().push(buffer.arena.len());
            buffer.arena.push(record);
        }
        Ok(buffer)
    }

    /// Records sharing `key`, in arrival order.
    pub fn matches<'a>(&'a self, key: &Key) -> impl Iterator<Item = &'a Record> + 'a {
        self.index
            .get(key)
            .into_iter()
            .flat_map(move |slots| slots.iter().map(move |&i| &self.arena[i]))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn distinct_keys(&self) -> usize {
        self.index.len()
    }

    pub fn estimated_bytes(&self) -> usize {
        self.bytes
    }
}
