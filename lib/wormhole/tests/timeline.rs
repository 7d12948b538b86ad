use std::time::Duration;

use tokio::time::timeout;
use tokio_test::assert_ok;
use wormhole::{gate, EventKind, FutureHandle, Mode, Payload};

fn sorted_payloads(future: &FutureHandle) -> Vec<String> {
    let mut payloads = future
        .events()
        .iter()
        .map(|event| {
            assert_eq!(event.kind(), EventKind::Complete);
            event.payload().as_str().unwrap_or_default().to_string()
        })
        .collect::<Vec<_>>();
    payloads.sort();
    payloads
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_and_delayed_signals_all_land_in_timeline() {
    let future = FutureHandle::new(Mode::Einstein);

    let releaser = future.clone();
    assert_ok!(future.register_complete(move |payload: Payload| {
        if payload.as_str() == Some("delayed 2") {
            gate::unblock(&releaser).unwrap();
        }
    }));

    for (delay, payload) in [(100, "delayed 1"), (200, "delayed 2")] {
        let signaller = future.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            signaller.signal_complete(payload).unwrap();
        });
    }

    let mut expected = Vec::new();
    for i in 0..10 {
        let payload = format!("immediate {}", i);
        assert_ok!(future.signal_complete(payload.clone()));
        expected.push(payload);
    }
    expected.push("delayed 1".to_string());
    expected.push("delayed 2".to_string());
    expected.sort();

    assert_ok!(timeout(Duration::from_secs(5), gate::block_async(&future)).await.unwrap());
    assert_ok!(timeout(Duration::from_secs(5), future.settle()).await.unwrap());

    assert_eq!(future.signal_count(), 12);
    similar_asserts::assert_eq!(sorted_payloads(&future), expected);

    assert_ok!(future.destroy());
    assert!(future.events().is_empty());
}

#[tokio::test]
async fn events_are_recorded_in_arrival_order() {
    let future = FutureHandle::new(Mode::Hawking);
    assert_ok!(future.register_complete(|_| {}));

    // Each signal settles before the next one is sent, so arrival order is fixed.
    let mut expected = Vec::new();
    for i in 0..5 {
        let payload = format!("sequential {}", i);
        assert_ok!(future.signal_complete(payload.clone()));
        assert_ok!(future.settle().await);
        expected.push(payload);
    }

    let recorded = future
        .events()
        .iter()
        .map(|event| event.payload().as_str().unwrap_or_default().to_string())
        .collect::<Vec<_>>();
    similar_asserts::assert_eq!(recorded, expected);
}

#[tokio::test]
async fn timeline_survives_alter_between_runs() {
    let future = FutureHandle::new(Mode::Einstein);
    assert_ok!(future.register_complete(|_| {}));
    assert_ok!(future.register_error(|_| {}));

    assert_ok!(future.signal_complete("first run"));
    assert_ok!(future.signal_error("first run failed"));
    assert_ok!(future.settle().await);
    assert_eq!(future.signal_count(), 2);

    assert_ok!(future.alter());

    assert_ok!(future.signal_error("second run failed"));
    assert_ok!(future.settle().await);

    let events = future.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind(), EventKind::Error);
    assert_eq!(events[0].payload().as_str(), Some("second run failed"));
}
