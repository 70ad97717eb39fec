// tests/failure_propagation.rs

mod common;
use crate::common::builders::JobConfigBuilder;
use crate::common::{init_tracing, ranks, source, transitions, with_timeout};

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::anyhow;
use iterdag::engine::{IterationJob, JobInputs, JobStages};
use iterdag::errors::{IterdagError, Result};
use iterdag::io::MemorySink;
use iterdag::pagerank::{pagerank_job, pagerank_stages};
use iterdag::record::{Key, Record};
use iterdag::stage::ReduceStage;
use iterdag::sync::{FnCriterion, TerminationReason};
use iterdag::types::{ConvergenceVerdict, Role};

/// Fails on its `fail_at`-th call.
#[derive(Debug)]
struct FailingReducer {
    calls: AtomicUsize,
    fail_at: usize,
}

impl ReduceStage for FailingReducer {
    fn reduce(&self, key: &Key, group: Vec<Record>) -> Result<Record> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.fail_at {
            return Err(IterdagError::MalformedRecord(format!("refusing key {key}")));
        }
        let sum: f64 = group.iter().map(|r| r.double(1).unwrap()).sum();
        Ok(Record::new(vec![key.to_field(), sum.into()]))
    }
}

fn root_cause(err: &IterdagError) -> &IterdagError {
    match err {
        IterdagError::StageFailed { source, .. } => root_cause(source),
        other => other,
    }
}

#[tokio::test]
async fn failing_tail_aborts_the_job_with_its_own_error() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .parallelism(2)
        .max_supersteps(10)
        .cap_only()
        .build();

    let mut stages = pagerank_stages();
    stages.tail = Arc::new(FailingReducer {
        calls: AtomicUsize::new(0),
        fail_at: 3,
    });
    let job = IterationJob::new(
        cfg,
        stages,
        JobInputs {
            seed: source(ranks(&[(1, 0.5), (2, 0.5)])),
            companion: source(transitions(&[(1, 2, 1.0), (2, 1, 1.0)])),
            transition: None,
        },
        Arc::new(MemorySink::new()),
    );

    let err = with_timeout(job.run()).await.unwrap_err();

    match &err {
        IterdagError::StageFailed { role, .. } => assert_eq!(*role, Role::Tail),
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert!(matches!(root_cause(&err), IterdagError::MalformedRecord(msg) if msg.contains("refusing")));
    assert!(!err.is_secondary());
}

#[tokio::test]
async fn malformed_seed_record_fails_at_the_source() {
    init_tracing();
    let cfg = JobConfigBuilder::new().parallelism(2).build();
    let sink = Arc::new(MemorySink::new());

    // A double cannot be a partitioning key.
    let seed = vec![iterdag::record!(1.5f64, 1.0f64)];
    let job = pagerank_job(
        cfg,
        source(seed),
        source(transitions(&[(1, 1, 1.0)])),
        sink.clone(),
    );
    let err = with_timeout(job.run()).await.unwrap_err();

    match &err {
        IterdagError::StageFailed { role, .. } => assert_eq!(*role, Role::SeedSource),
        other => panic!("expected StageFailed, got {other:?}"),
    }
    assert!(matches!(root_cause(&err), IterdagError::MalformedRecord(_)));
    assert!(sink.records().is_empty(), "nothing may be written after an abort");
}

#[tokio::test]
async fn criterion_error_counts_as_not_converged() {
    init_tracing();
    let cfg = JobConfigBuilder::new().max_supersteps(5).build();

    let criterion = FnCriterion(|_statistic: f64, superstep: u32| {
        if superstep == 0 {
            Err(anyhow!("not ready yet"))
        } else {
            Ok(ConvergenceVerdict::converged("second look"))
        }
    });
    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 1.0)])),
        source(transitions(&[(1, 1, 1.0)])),
        Arc::new(MemorySink::new()),
    )
    .with_criterion(Arc::new(criterion));

    let report = with_timeout(job.run()).await.unwrap();
    assert_eq!(report.final_superstep, 1);
    assert_eq!(
        report.termination,
        TerminationReason::Converged(Some("second look".to_string()))
    );
}

#[tokio::test]
async fn transition_set_is_broadcast_to_every_head() {
    use iterdag::stage::MapStage;

    /// Scales each rank by the number of records in the transition set.
    #[derive(Debug)]
    struct ScaleByCompanion;

    impl MapStage for ScaleByCompanion {
        fn map(&self, record: Record, companion: &[Record], out: &mut Vec<Record>) -> Result<()> {
            let key = record.key(0)?;
            let rank = record.double(1)?;
            out.push(Record::new(vec![key.to_field(), (rank * companion.len() as f64).into()]));
            Ok(())
        }
    }

    init_tracing();
    let cfg = JobConfigBuilder::new()
        .parallelism(2)
        .max_supersteps(0)
        .cap_only()
        .build();
    let sink = Arc::new(MemorySink::new());

    let stages = JobStages {
        head: Arc::new(ScaleByCompanion),
        ..pagerank_stages()
    };
    let job = IterationJob::new(
        cfg,
        stages,
        JobInputs {
            seed: source(ranks(&[(1, 0.25), (2, 0.5), (3, 1.0)])),
            companion: source(transitions(&[(1, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0)])),
            transition: Some(source(ranks(&[(10, 0.0), (11, 0.0)]))),
        },
        sink.clone(),
    );
    let report = with_timeout(job.run()).await.unwrap();
    assert_eq!(report.final_superstep, 0);

    let mut out: Vec<(i64, f64)> = sink
        .records()
        .iter()
        .map(|r| (r.field(0).unwrap().as_long().unwrap(), r.double(1).unwrap()))
        .collect();
    out.sort_by_key(|(v, _)| *v);
    assert_eq!(out, vec![(1, 0.5), (2, 1.0), (3, 2.0)]);
}
