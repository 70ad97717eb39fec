// tests/pagerank_job.rs

mod common;
use crate::common::builders::JobConfigBuilder;
use crate::common::{
    complete_graph, init_tracing, rank_table, ranks, source, transitions, with_timeout,
    RecordingProbe,
};

use std::sync::Arc;

use iterdag::channel::partition_for;
use iterdag::io::MemorySink;
use iterdag::pagerank::pagerank_job;
use iterdag::sync::TerminationReason;
use iterdag::types::ShipStrategy;

#[tokio::test]
async fn single_self_loop_converges_immediately() {
    init_tracing();
    let cfg = JobConfigBuilder::new().max_supersteps(5).epsilon(1e-6).build();
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 1.0)])),
        source(transitions(&[(1, 1, 1.0)])),
        sink.clone(),
    );
    let report = with_timeout(job.run()).await.unwrap();

    assert!(report.converged());
    assert!(report.final_superstep <= 5);
    assert_eq!(report.statistics.len() as u32, report.final_superstep + 1);
    assert_eq!(rank_table(&sink), vec![(1, 1.0)]);
}

#[tokio::test]
async fn empty_companion_converges_at_superstep_zero() {
    init_tracing();
    let cfg = JobConfigBuilder::new().max_supersteps(5).epsilon(1e-6).build();
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 0.5), (2, 0.5)])),
        source(Vec::new()),
        sink.clone(),
    );
    let report = with_timeout(job.run()).await.unwrap();

    assert_eq!(report.final_superstep, 0);
    assert!(report.converged());
    assert_eq!(report.statistics, vec![0.0]);
    // Output is the state the halting superstep started from.
    assert_eq!(rank_table(&sink), vec![(1, 0.5), (2, 0.5)]);
}

#[tokio::test]
async fn complete_graph_converges_to_uniform_ranks() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .max_supersteps(100)
        .epsilon(1e-6)
        .build();
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 1.0), (2, 0.0), (3, 0.0)])),
        source(complete_graph(3)),
        sink.clone(),
    );
    let report = with_timeout(job.run()).await.unwrap();

    assert!(report.converged(), "expected convergence, got {report}");
    assert!(report.final_superstep < 100);
    assert!(*report.statistics.last().unwrap() < 1e-6);
    assert!((report.statistics[0] - 2.0).abs() < 1e-12);

    let table = rank_table(&sink);
    assert_eq!(table.len(), 3);
    for (_, rank) in &table {
        assert!((rank - 1.0 / 3.0).abs() < 1e-5, "rank {rank} not near 1/3");
    }
    let total: f64 = table.iter().map(|(_, r)| r).sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn oscillating_ranks_stop_at_the_cap() {
    init_tracing();
    let cfg = JobConfigBuilder::new().max_supersteps(3).epsilon(1e-6).build();
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 0.75), (2, 0.25)])),
        source(transitions(&[(1, 2, 1.0), (2, 1, 1.0)])),
        sink.clone(),
    );
    let report = with_timeout(job.run()).await.unwrap();

    assert_eq!(report.termination, TerminationReason::IterationCap);
    assert!(!report.converged());
    assert_eq!(report.final_superstep, 3);
    assert_eq!(report.statistics.len(), 4);
    for statistic in &report.statistics {
        assert!((statistic - 1.0).abs() < 1e-12);
    }
    // Superstep 3 started from the state produced by superstep 2: swapped.
    assert_eq!(rank_table(&sink), vec![(1, 0.25), (2, 0.75)]);
}

#[tokio::test]
async fn cap_only_criterion_runs_exactly_to_the_cap() {
    init_tracing();
    let cfg = JobConfigBuilder::new().max_supersteps(4).cap_only().build();
    let probe = Arc::new(RecordingProbe::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 1.0)])),
        source(transitions(&[(1, 1, 1.0)])),
        Arc::new(MemorySink::new()),
    )
    .with_probe(probe.clone());
    let report = with_timeout(job.run()).await.unwrap();

    assert_eq!(report.termination, TerminationReason::IterationCap);
    assert_eq!(report.final_superstep, 4);
    let supersteps: Vec<u32> = probe.head_reads().keys().map(|(_, s)| *s).collect();
    assert_eq!(supersteps, vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn two_partitions_keep_every_key_in_its_partition() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .parallelism(2)
        .max_supersteps(3)
        .cap_only()
        .build();
    let probe = Arc::new(RecordingProbe::new());
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 0.4), (2, 0.3), (3, 0.2), (4, 0.1)])),
        source(complete_graph(4)),
        sink.clone(),
    )
    .with_probe(probe.clone());
    let report = with_timeout(job.run()).await.unwrap();
    assert_eq!(report.final_superstep, 3);

    let reads = probe.head_reads();
    let writes = probe.backchannel_writes();

    for superstep in 0..=3 {
        let mut seen = Vec::new();
        for partition in 0..2 {
            let state = reads
                .get(&(partition, superstep))
                .unwrap_or_else(|| panic!("no head read for {partition}/{superstep}"));
            for record in state {
                let key = record.key(0).unwrap();
                assert_eq!(partition_for(&key, 2), partition, "key {key} migrated");
                seen.push(key);
            }
        }
        seen.sort();
        assert_eq!(seen.len(), 4, "superstep {superstep} lost or duplicated keys");
    }

    // What a Head reads at s is exactly what its Tail wrote for s.
    for partition in 0..2 {
        for superstep in 1..=3 {
            assert_eq!(
                reads.get(&(partition, superstep)),
                writes.get(&(partition, superstep)),
                "backchannel round trip broke at {partition}/{superstep}"
            );
        }
    }

    let sink_partitions = sink.partitions();
    assert_eq!(sink_partitions.len(), 2);
    for partition in 0..2 {
        assert_eq!(sink_partitions.get(&partition), reads.get(&(partition, 3)));
    }
}

#[tokio::test]
async fn parallel_and_single_partition_runs_agree() {
    init_tracing();
    let seed = ranks(&[(1, 0.4), (2, 0.3), (3, 0.2), (4, 0.1), (5, 0.0)]);

    let mut tables = Vec::new();
    for parallelism in [1, 3] {
        let cfg = JobConfigBuilder::new()
            .parallelism(parallelism)
            .max_supersteps(6)
            .cap_only()
            .build();
        let sink = Arc::new(MemorySink::new());
        let job = pagerank_job(
            cfg,
            source(seed.clone()),
            source(complete_graph(5)),
            sink.clone(),
        );
        with_timeout(job.run()).await.unwrap();
        tables.push(rank_table(&sink));
    }

    assert_eq!(tables[0].len(), 5);
    for ((v1, r1), (v3, r3)) in tables[0].iter().zip(&tables[1]) {
        assert_eq!(v1, v3);
        assert!((r1 - r3).abs() < 1e-12);
    }
}

#[tokio::test]
async fn spilling_tail_matches_in_memory_run() {
    init_tracing();
    let seed = ranks(&[(1, 0.4), (2, 0.3), (3, 0.2), (4, 0.1), (5, 0.0)]);

    let in_memory = {
        let cfg = JobConfigBuilder::new().parallelism(2).max_supersteps(4).cap_only().build();
        let sink = Arc::new(MemorySink::new());
        let job = pagerank_job(cfg, source(seed.clone()), source(complete_graph(5)), sink.clone());
        with_timeout(job.run()).await.unwrap();
        rank_table(&sink)
    };

    // One byte per partition: every partial becomes its own run, and two
    // file handles force intermediate merge passes.
    let cfg = JobConfigBuilder::new()
        .parallelism(2)
        .max_supersteps(4)
        .cap_only()
        .memory_bytes(1)
        .max_file_handles(2)
        .build();
    let probe = Arc::new(RecordingProbe::new());
    let sink = Arc::new(MemorySink::new());
    let job = pagerank_job(cfg, source(seed), source(complete_graph(5)), sink.clone())
        .with_probe(probe.clone());
    with_timeout(job.run()).await.unwrap();

    let sorts = probe.tail_sorts();
    assert_eq!(sorts.len(), 2 * 5, "one sort per tail partition and superstep");
    for ((partition, superstep), stats) in &sorts {
        assert_eq!(
            stats.spilled_runs, stats.records,
            "tail {partition} at {superstep} kept records in memory"
        );
    }
    assert!(sorts.values().any(|stats| stats.merge_passes > 0));

    let spilled = rank_table(&sink);
    assert_eq!(spilled.len(), in_memory.len());
    for ((v1, r1), (v2, r2)) in in_memory.iter().zip(&spilled) {
        assert_eq!(v1, v2);
        assert!((r1 - r2).abs() < 1e-12, "vertex {v1}: {r1} vs {r2}");
    }
}

#[tokio::test]
async fn hashed_join_inputs_keep_rank_mass() {
    init_tracing();
    let cfg = JobConfigBuilder::new()
        .parallelism(2)
        .max_supersteps(1)
        .cap_only()
        .head_to_intermediate(ShipStrategy::PartitionHash)
        .companion_to_intermediate(ShipStrategy::PartitionHash)
        .build();
    let sink = Arc::new(MemorySink::new());

    let job = pagerank_job(
        cfg,
        source(ranks(&[(1, 0.5), (2, 0.5)])),
        source(complete_graph(2)),
        sink.clone(),
    );
    with_timeout(job.run()).await.unwrap();

    let table = rank_table(&sink);
    assert_eq!(table.len(), 2);
    let mass: f64 = table.iter().map(|(_, rank)| rank).sum();
    assert!((mass - 1.0).abs() < 1e-12, "rank mass drifted to {mass}");
    for (_, rank) in &table {
        assert!((rank - 0.5).abs() < 1e-12);
    }
}
