// tests/channel_gate.rs

use iterdag::channel::{partition_for, wire_edge, EdgeSpec, Envelope, InputGate};
use iterdag::errors::IterdagError;
use iterdag::record;
use iterdag::record::{Key, Record};
use iterdag::types::ShipStrategy;
use tokio::sync::mpsc;

fn rec(sender: usize, value: i64) -> Envelope {
    Envelope::Record {
        sender,
        record: record!(value),
    }
}

fn end(sender: usize, superstep: u32) -> Envelope {
    Envelope::EndOfSuperstep { sender, superstep }
}

fn values(records: &[Record]) -> Vec<i64> {
    records
        .iter()
        .map(|r| r.field(0).unwrap().as_long().unwrap())
        .collect()
}

#[tokio::test]
async fn collect_orders_by_sender_then_arrival() {
    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 2);

    for envelope in [rec(1, 10), rec(0, 1), rec(1, 11), rec(0, 2), end(1, 0), end(0, 0)] {
        tx.send(envelope).await.unwrap();
    }

    let records = gate.collect(0).await.unwrap();
    assert_eq!(values(&records), vec![1, 2, 10, 11]);
}

#[tokio::test]
async fn records_of_a_sender_that_is_ahead_wait_for_their_superstep() {
    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 2);

    // Sender 0 finishes superstep 0 and already emits superstep 1.
    for envelope in [rec(0, 1), end(0, 0), rec(0, 100), rec(1, 2), end(1, 0)] {
        tx.send(envelope).await.unwrap();
    }

    let first = gate.collect(0).await.unwrap();
    assert_eq!(values(&first), vec![1, 2]);
    assert_eq!(gate.buffered(1), 1);
    assert!(!gate.is_complete(1));

    for envelope in [end(0, 1), rec(1, 200), end(1, 1)] {
        tx.send(envelope).await.unwrap();
    }
    let second = gate.collect(1).await.unwrap();
    assert_eq!(values(&second), vec![100, 200]);
}

#[tokio::test]
async fn next_streams_until_the_superstep_is_complete() {
    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 1);

    for envelope in [rec(0, 1), rec(0, 2), end(0, 0)] {
        tx.send(envelope).await.unwrap();
    }

    let mut seen = Vec::new();
    while let Some(record) = gate.next(0).await.unwrap() {
        seen.push(record);
    }
    assert_eq!(values(&seen), vec![1, 2]);

    // Superstep 0 is released now.
    assert!(matches!(
        gate.collect(0).await,
        Err(IterdagError::BarrierMismatch(_))
    ));
}

#[tokio::test]
async fn wrong_marker_and_unknown_sender_are_mismatches() {
    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 1);
    tx.send(end(0, 3)).await.unwrap();
    assert!(matches!(
        gate.collect(0).await,
        Err(IterdagError::BarrierMismatch(msg)) if msg.contains("marked end of superstep 3")
    ));

    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 1);
    tx.send(rec(0, 1)).await.unwrap();
    tx.send(rec(1, 2)).await.unwrap();
    assert!(matches!(
        gate.collect(0).await,
        Err(IterdagError::BarrierMismatch(msg)) if msg.contains("unexpected sender")
    ));
}

#[tokio::test]
async fn closed_channel_before_completion_is_a_disconnect() {
    let (tx, rx) = mpsc::channel(16);
    let mut gate = InputGate::new("test", rx, 2);
    tx.send(end(0, 0)).await.unwrap();
    drop(tx);

    let err = gate.collect(0).await.unwrap_err();
    assert!(matches!(err, IterdagError::Disconnected(_)));
    assert!(err.is_secondary());
}

#[tokio::test]
async fn hash_edge_routes_each_key_to_one_receiver() {
    let spec = EdgeSpec {
        name: "hash",
        strategy: ShipStrategy::PartitionHash,
        key_field: 0,
        senders: 2,
        receivers: 3,
    };
    let (senders, gates) = wire_edge(spec, 64);
    assert!(gates.iter().all(|g| g.expected_senders() == 2));

    for (i, sender) in senders.iter().enumerate() {
        let start = i as i64 * 10;
        sender
            .send_all((start..start + 10).map(|v| record!(v)))
            .await
            .unwrap();
        sender.end_superstep(0).await.unwrap();
    }

    let mut total = 0;
    for (partition, mut gate) in gates.into_iter().enumerate() {
        for record in gate.collect(0).await.unwrap() {
            assert_eq!(partition_for(&record.key(0).unwrap(), 3), partition);
            total += 1;
        }
    }
    assert_eq!(total, 20);
}

#[tokio::test]
async fn broadcast_and_forward_edges() {
    let spec = EdgeSpec {
        name: "broadcast",
        strategy: ShipStrategy::Broadcast,
        key_field: 0,
        senders: 2,
        receivers: 2,
    };
    let (senders, gates) = wire_edge(spec, 64);
    for (i, sender) in senders.iter().enumerate() {
        sender.send(record!(i as i64)).await.unwrap();
        sender.end_superstep(0).await.unwrap();
    }
    for mut gate in gates {
        assert_eq!(values(&gate.collect(0).await.unwrap()), vec![0, 1]);
    }

    let spec = EdgeSpec {
        name: "forward",
        strategy: ShipStrategy::Forward,
        key_field: 0,
        senders: 2,
        receivers: 2,
    };
    let (senders, gates) = wire_edge(spec, 64);
    assert!(gates.iter().all(|g| g.expected_senders() == 1));
    for (i, sender) in senders.iter().enumerate() {
        sender.send(record!(i as i64 * 7)).await.unwrap();
        sender.end_superstep(0).await.unwrap();
    }
    for (i, mut gate) in gates.into_iter().enumerate() {
        assert_eq!(values(&gate.collect(0).await.unwrap()), vec![i as i64 * 7]);
    }
}

#[test]
fn hash_partitioning_is_stable_and_in_range() {
    for v in -50i64..50 {
        let key = Key::Long(v);
        let p = partition_for(&key, 4);
        assert!(p < 4);
        assert_eq!(p, partition_for(&key, 4));
    }
    assert_eq!(partition_for(&Key::Text("anything".into()), 1), 0);
    // Same bytes, same partition, regardless of construction.
    assert_eq!(
        partition_for(&Key::Text("vertex".to_string()), 7),
        partition_for(&Key::Text(String::from("vertex")), 7)
    );
}
