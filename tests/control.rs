// tests/control.rs

use iterdag::errors::IterdagError;
use iterdag::sync::{Control, ControlEvent, ControlReceiver};
use tokio::sync::watch;

#[tokio::test]
async fn worker_moves_to_the_released_superstep() {
    let (tx, rx) = watch::channel(ControlEvent::Proceed(0));
    let mut control = ControlReceiver::new(rx);

    let waiter = tokio::spawn(async move { control.after(0).await });
    tx.send_replace(ControlEvent::Proceed(1));
    assert_eq!(waiter.await.unwrap().unwrap(), Control::Next(1));
}

#[tokio::test]
async fn trailing_worker_steps_one_superstep_at_a_time() {
    let (tx, rx) = watch::channel(ControlEvent::Halt { superstep: 3 });
    let mut control = ControlReceiver::new(rx);

    // Still finishing superstep 1 when the job already halted at 3.
    assert_eq!(control.after(1).await.unwrap(), Control::Next(2));
    assert_eq!(control.after(2).await.unwrap(), Control::Next(3));
    assert_eq!(control.after(3).await.unwrap(), Control::Halt);
    assert!(matches!(
        control.after(4).await,
        Err(IterdagError::BarrierMismatch(_))
    ));

    tx.send_replace(ControlEvent::Proceed(5));
    assert_eq!(control.after(1).await.unwrap(), Control::Next(2));
}

#[tokio::test]
async fn abort_and_closed_channel_are_secondary_errors() {
    let (tx, rx) = watch::channel(ControlEvent::Abort);
    let mut control = ControlReceiver::new(rx);
    let err = control.after(0).await.unwrap_err();
    assert!(err.is_secondary());

    let (tx2, rx2) = watch::channel(ControlEvent::Proceed(0));
    let mut control = ControlReceiver::new(rx2);
    drop(tx2);
    let err = control.after(0).await.unwrap_err();
    assert!(matches!(err, IterdagError::Disconnected(_)));
    drop(tx);
}
