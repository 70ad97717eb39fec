// src/pagerank.rs

//! PageRank without damping, as an iteration job.
//!
//! Inputs:
//! - state: `(vertex, rank)` per line,
//! - companion: the transition matrix as `(source, target, probability)`.
//!
//! Each superstep computes `rank'(t) = Σ rank(s) · p(s, t)`. A vertex with no
//! incoming transitions drops out of the state.

use std::sync::Arc;

use crate::config::JobConfig;
use crate::engine::{IterationJob, JobInputs, JobStages};
use crate::errors::{IterdagError, Result};
use crate::io::{RecordSink, RecordSource};
use crate::record::{Key, Record};
use crate::stage::{DeltaStage, IdentityMap, MatchStage, ReduceStage};

/// Joins `(vertex, rank)` with `(vertex, target, probability)` and emits the
/// partial rank `(target, rank · probability)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DotProductMatch;

impl MatchStage for DotProductMatch {
    fn join(&self, working: &Record, companion: &Record, out: &mut Vec<Record>) -> Result<()> {
        let rank = working.double(1)?;
        let target = companion.key(1)?;
        let probability = companion.double(2)?;
        out.push(Record::new(vec![target.to_field(), (rank * probability).into()]));
        Ok(())
    }
}

/// Sums the partial ranks of one vertex.
#[derive(Debug, Clone, Copy, Default)]
pub struct SumReducer;

impl ReduceStage for SumReducer {
    fn reduce(&self, key: &Key, group: Vec<Record>) -> Result<Record> {
        if group.is_empty() {
            return Err(IterdagError::MalformedRecord(format!(
                "empty group for vertex {key}"
            )));
        }
        let mut sum = 0.0;
        for record in &group {
            sum += record.double(1)?;
        }
        Ok(Record::new(vec![key.to_field(), sum.into()]))
    }
}

/// Absolute change of one vertex's rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankDiff;

impl DeltaStage for RankDiff {
    fn delta(&self, previous: &Record, current: &Record) -> Result<f64> {
        Ok((current.double(1)? - previous.double(1)?).abs())
    }
}

pub fn pagerank_stages() -> JobStages {
    JobStages {
        head: Arc::new(IdentityMap),
        intermediate: Arc::new(DotProductMatch),
        tail: Arc::new(SumReducer),
        delta: Arc::new(RankDiff),
    }
}

/// PageRank over `ranks` and `transitions`, with the criterion and wiring
/// from `config`.
pub fn pagerank_job(
    config: JobConfig,
    ranks: Arc<dyn RecordSource>,
    transitions: Arc<dyn RecordSource>,
    sink: Arc<dyn RecordSink>,
) -> IterationJob {
    let inputs = JobInputs {
        seed: ranks,
        companion: transitions,
        transition: None,
    };
    IterationJob::new(config, pagerank_stages(), inputs, sink)
}
