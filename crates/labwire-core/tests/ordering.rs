//! Responses are never attributed to the wrong query.

mod common;

use common::session_over;
use labwire_core::mock::SimulatedDevice;
use labwire_core::worker::{SessionWorker, DEFAULT_MAILBOX_CAPACITY};
use labwire_core::{PropertyTable, Terminator};
use std::sync::Arc;
use std::time::Duration;

fn delayed_device(seed: u64) -> SimulatedDevice {
    let mut device = SimulatedDevice::new(Terminator::lf())
        .with_random_delay(Duration::from_millis(0), Duration::from_millis(15))
        .with_seed(seed);
    for channel in 1..=4 {
        device = device.with_register(format!("OUTP? {channel}"), format!("{channel}.000000"));
    }
    device
}

#[tokio::test]
async fn sequential_queries_under_random_delays() {
    for seed in [1, 7, 42] {
        let mut session = session_over(delayed_device(seed).spawn(), Terminator::lf());

        for round in 0..10 {
            let channel = (round % 4) + 1;
            let response = session.query(&format!("OUTP? {channel}")).await.unwrap();
            assert_eq!(response.text(), format!("{channel}.000000"), "seed {seed}");
        }
    }
}

#[tokio::test]
async fn shared_session_serializes_concurrent_callers() {
    let session = session_over(delayed_device(3).spawn(), Terminator::lf()).into_shared();

    let mut tasks = Vec::new();
    for channel in 1..=4u32 {
        let session = Arc::clone(&session);
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let response = session
                    .lock()
                    .await
                    .query(&format!("OUTP? {channel}"))
                    .await
                    .unwrap();
                assert_eq!(response.text(), format!("{channel}.000000"));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
}

#[tokio::test]
async fn worker_serializes_concurrent_callers() {
    let session = session_over(delayed_device(9).spawn(), Terminator::lf());
    let (handle, join) = SessionWorker::spawn(
        "sr830",
        session,
        Arc::new(PropertyTable::new()),
        DEFAULT_MAILBOX_CAPACITY,
    );

    let mut tasks = Vec::new();
    for channel in 1..=4u32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..5 {
                let response = handle.query(format!("OUTP? {channel}")).await.unwrap();
                assert_eq!(response.text(), format!("{channel}.000000"));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    handle.shutdown().await.unwrap();
    join.await.unwrap();
    assert!(handle.query("OUTP? 1").await.is_err());
}
