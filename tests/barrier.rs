// tests/barrier.rs

use iterdag::errors::IterdagError;
use iterdag::sync::{
    Barrier, BarrierSignal, BarrierState, BarrierStep, Decision, L1NormCriterion,
    MaxSuperstepsOnly, TerminationReason,
};
use proptest::prelude::*;

fn head(partition: usize, superstep: u32) -> BarrierSignal {
    BarrierSignal::HeadState {
        partition,
        superstep,
        records: 1,
    }
}

fn delta(partition: usize, superstep: u32, statistic: f64) -> BarrierSignal {
    BarrierSignal::Delta {
        partition,
        superstep,
        statistic,
    }
}

#[test]
fn waits_for_every_partition_before_evaluating() {
    let mut barrier = Barrier::new(2, 2, 10);

    assert_eq!(barrier.offer(head(0, 0)).unwrap(), BarrierStep::Waiting);
    assert_eq!(barrier.offer(delta(1, 0, 0.5)).unwrap(), BarrierStep::Waiting);
    assert_eq!(barrier.offer(head(1, 0)).unwrap(), BarrierStep::Waiting);
    assert_eq!(barrier.state(), BarrierState::AwaitingSignals(0));
    assert_eq!(barrier.offer(delta(0, 0, 0.25)).unwrap(), BarrierStep::Ready(0));
    assert_eq!(barrier.state(), BarrierState::Evaluating(0));

    let decision = barrier.evaluate(&L1NormCriterion::new(0.1)).unwrap();
    assert_eq!(
        decision,
        Decision::Continue {
            next: 1,
            statistic: 0.75
        }
    );
    assert_eq!(barrier.state(), BarrierState::Continuing(1));
    assert_eq!(barrier.begin_next().unwrap(), BarrierStep::Waiting);
    assert_eq!(barrier.state(), BarrierState::AwaitingSignals(1));
}

#[test]
fn converges_when_statistic_drops_below_epsilon() {
    let mut barrier = Barrier::new(1, 1, 10);
    barrier.offer(head(0, 0)).unwrap();
    barrier.offer(delta(0, 0, 1e-9)).unwrap();

    match barrier.evaluate(&L1NormCriterion::new(1e-6)).unwrap() {
        Decision::Terminate {
            superstep, reason, ..
        } => {
            assert_eq!(superstep, 0);
            assert!(matches!(reason, TerminationReason::Converged(Some(_))));
        }
        other => panic!("expected termination, got {other:?}"),
    }
    assert_eq!(barrier.state(), BarrierState::Terminated);
    assert!(matches!(
        barrier.offer(head(0, 1)),
        Err(IterdagError::BarrierMismatch(_))
    ));
}

#[test]
fn signals_for_the_next_superstep_are_buffered() {
    let mut barrier = Barrier::new(2, 1, 10);

    barrier.offer(head(0, 0)).unwrap();
    // Partition 0 already moved on.
    assert_eq!(barrier.offer(head(0, 1)).unwrap(), BarrierStep::Buffered);
    assert_eq!(barrier.buffered_signals(), 1);
    assert_eq!(barrier.counted_signals(), 1);

    barrier.offer(head(1, 0)).unwrap();
    assert_eq!(barrier.offer(delta(0, 0, 5.0)).unwrap(), BarrierStep::Ready(0));
    barrier.evaluate(&MaxSuperstepsOnly).unwrap();

    // Signals arriving between the decision and begin_next are early too.
    assert_eq!(barrier.offer(delta(0, 1, 5.0)).unwrap(), BarrierStep::Buffered);
    assert_eq!(barrier.begin_next().unwrap(), BarrierStep::Waiting);
    assert_eq!(barrier.counted_signals(), 2);
    assert_eq!(barrier.buffered_signals(), 0);
    assert_eq!(barrier.offer(head(1, 1)).unwrap(), BarrierStep::Ready(1));
}

#[test]
fn begin_next_is_ready_when_all_signals_arrived_early() {
    let mut barrier = Barrier::new(1, 1, 10);
    barrier.offer(head(0, 0)).unwrap();
    barrier.offer(head(0, 1)).unwrap();
    barrier.offer(delta(0, 0, 1.0)).unwrap();
    barrier.evaluate(&MaxSuperstepsOnly).unwrap();
    barrier.offer(delta(0, 1, 1.0)).unwrap();

    assert_eq!(barrier.begin_next().unwrap(), BarrierStep::Ready(1));
    assert_eq!(barrier.state(), BarrierState::Evaluating(1));
}

#[test]
fn protocol_violations_are_mismatches() {
    let mut barrier = Barrier::new(2, 2, 10);
    barrier.offer(head(0, 0)).unwrap();

    assert!(matches!(
        barrier.offer(head(0, 0)),
        Err(IterdagError::BarrierMismatch(msg)) if msg.contains("duplicate")
    ));
    assert!(matches!(
        barrier.offer(head(5, 0)),
        Err(IterdagError::BarrierMismatch(msg)) if msg.contains("unknown partition")
    ));
    assert!(matches!(
        barrier.offer(delta(0, 2, 0.0)),
        Err(IterdagError::BarrierMismatch(_))
    ));
    assert!(matches!(
        barrier.evaluate(&MaxSuperstepsOnly),
        Err(IterdagError::BarrierMismatch(_))
    ));
    assert!(matches!(
        barrier.begin_next(),
        Err(IterdagError::BarrierMismatch(_))
    ));
}

#[test]
fn cap_terminates_after_max_supersteps() {
    let mut barrier = Barrier::new(1, 1, 2);
    for superstep in 0..=2 {
        barrier.offer(head(0, superstep)).unwrap();
        barrier.offer(delta(0, superstep, 1.0)).unwrap();
        let decision = barrier.evaluate(&MaxSuperstepsOnly).unwrap();
        if superstep < 2 {
            assert!(matches!(decision, Decision::Continue { next, .. } if next == superstep + 1));
            barrier.begin_next().unwrap();
        } else {
            assert_eq!(
                decision,
                Decision::Terminate {
                    superstep: 2,
                    statistic: 1.0,
                    reason: TerminationReason::IterationCap
                }
            );
        }
    }
    assert_eq!(barrier.statistics(), &[1.0, 1.0, 1.0]);
}

#[test]
fn criterion_is_idempotent() {
    use iterdag::sync::ConvergenceCriterion;

    let criterion = L1NormCriterion::new(1e-3);
    for statistic in [0.0, 1e-4, 1e-3, 0.5, 10.0] {
        let first = criterion.evaluate(statistic, 3).unwrap();
        let second = criterion.evaluate(statistic, 3).unwrap();
        assert_eq!(first, second);
    }
    assert!(criterion.evaluate(f64::NAN, 0).is_err());
}

proptest! {
    /// However signals of superstep s and s+1 interleave, the barrier
    /// evaluates s exactly once, with the sum of s's deltas, and then has all
    /// s+1 signals counted or buffered.
    #[test]
    fn interleavings_evaluate_each_superstep_once(
        heads in 1usize..4,
        deltas in 1usize..4,
        stats in proptest::collection::vec(0u32..1000, 3),
        order in proptest::collection::vec(any::<u16>(), 0..16),
    ) {
        let mut barrier = Barrier::new(heads, deltas, 10);

        let mut current: Vec<BarrierSignal> = (0..heads).map(|p| head(p, 0)).collect();
        current.extend((0..deltas).map(|p| delta(p, 0, stats[p % stats.len()] as f64)));
        let mut early: Vec<BarrierSignal> = (0..heads).map(|p| head(p, 1)).collect();
        early.extend((0..deltas).map(|p| delta(p, 1, 0.0)));

        // Shuffle deterministically from `order`.
        let mut all: Vec<BarrierSignal> = current.iter().chain(early.iter()).copied().collect();
        for (i, r) in order.iter().enumerate() {
            let a = i % all.len();
            let b = *r as usize % all.len();
            all.swap(a, b);
        }

        let expected: f64 = (0..deltas).map(|p| stats[p % stats.len()] as f64).sum();
        let mut evaluated = 0;
        for signal in all {
            let step = barrier.offer(signal).unwrap();
            if step == BarrierStep::Ready(0) {
                evaluated += 1;
                let decision = barrier.evaluate(&MaxSuperstepsOnly).unwrap();
                prop_assert_eq!(decision, Decision::Continue { next: 1, statistic: expected });
                let after = barrier.begin_next().unwrap();
                prop_assert!(after == BarrierStep::Waiting || after == BarrierStep::Ready(1));
            }
        }

        prop_assert_eq!(evaluated, 1);
        prop_assert_eq!(barrier.state(), BarrierState::Evaluating(1));
        prop_assert_eq!(barrier.counted_signals(), heads + deltas);
    }
}
