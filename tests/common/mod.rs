#![allow(dead_code)]

pub use iterdag_test_utils::builders;
pub use iterdag_test_utils::probe::RecordingProbe;
pub use iterdag_test_utils::{init_tracing, with_timeout};

use std::sync::Arc;

use iterdag::io::{MemorySink, VecSource};
use iterdag::record::Record;

/// `(vertex, rank)` records.
pub fn ranks(entries: &[(i64, f64)]) -> Vec<Record> {
    entries
        .iter()
        .map(|&(vertex, rank)| iterdag::record!(vertex, rank))
        .collect()
}

/// `(source, target, probability)` records.
pub fn transitions(entries: &[(i64, i64, f64)]) -> Vec<Record> {
    entries
        .iter()
        .map(|&(source, target, p)| iterdag::record!(source, target, p))
        .collect()
}

/// Every vertex of a complete graph on `n` vertices links to the others
/// with equal probability.
pub fn complete_graph(n: i64) -> Vec<Record> {
    let p = 1.0 / (n - 1) as f64;
    let mut out = Vec::new();
    for source in 1..=n {
        for target in 1..=n {
            if source != target {
                out.push(iterdag::record!(source, target, p));
            }
        }
    }
    out
}

pub fn source(records: Vec<Record>) -> Arc<VecSource> {
    Arc::new(VecSource::new(records))
}

/// Final rank per vertex, sorted by vertex.
pub fn rank_table(sink: &MemorySink) -> Vec<(i64, f64)> {
    let mut out: Vec<(i64, f64)> = sink
        .records()
        .iter()
        .map(|r| {
            let vertex = r.field(0).and_then(|f| f.as_long()).unwrap();
            (vertex, r.double(1).unwrap())
        })
        .collect();
    out.sort_by_key(|(vertex, _)| *vertex);
    out
}
