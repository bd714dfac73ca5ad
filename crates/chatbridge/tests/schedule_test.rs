//! Recurring-send behavior under a paused clock.

use std::sync::atomic::Ordering;
use std::time::Duration;

use chatbridge::manager::GatewayError;

mod common;

use common::{make_ready, settle, test_gateway};

async fn advance(duration: Duration) {
    tokio::time::advance(duration).await;
    settle().await;
}

#[tokio::test(start_paused = true)]
async fn interval_validation() {
    let gateway = test_gateway();
    make_ready(&gateway, "u1").await;

    for bad in [0, -1, -60_000, 1500] {
        let err = gateway
            .manager
            .schedule("u1", "g1", "hi", bad)
            .await
            .unwrap_err();
        assert!(
            matches!(err, GatewayError::InvalidInterval(_)),
            "interval {bad} should be rejected"
        );
    }

    let outcome = gateway
        .manager
        .schedule("u1", "g1", "hi", 60_000)
        .await
        .unwrap();
    assert!(!outcome.replaced);
    assert_eq!(outcome.interval, Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn schedule_fires_on_each_interval() {
    let gateway = test_gateway();
    make_ready(&gateway, "u1").await;

    gateway
        .manager
        .schedule("u1", "g1", "tick", 60_000)
        .await
        .unwrap();

    // Nothing before the first interval elapses.
    advance(Duration::from_secs(59)).await;
    assert!(gateway.manager.history().await.unwrap().is_empty());

    // One record within the 60-61s window.
    advance(Duration::from_secs(2)).await;
    let history = gateway.manager.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].tenant_id, "u1");
    assert_eq!(history[0].destination, "g1");
    assert_eq!(history[0].body, "tick");

    // And again on the next boundary.
    advance(Duration::from_secs(60)).await;
    assert_eq!(gateway.manager.history().await.unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn replacement_cancels_previous_schedule() {
    let gateway = test_gateway();
    make_ready(&gateway, "u1").await;

    gateway
        .manager
        .schedule("u1", "g1", "first", 60_000)
        .await
        .unwrap();
    let outcome = gateway
        .manager
        .schedule("u1", "g2", "second", 60_000)
        .await
        .unwrap();
    assert!(outcome.replaced);

    advance(Duration::from_secs(61)).await;

    // No tick with the first schedule's parameters fires after replacement.
    let sent = gateway.drivers.client("u1").sent();
    assert_eq!(sent, vec![("g2".to_string(), "second".to_string())]);

    let history = gateway.manager.history().await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].destination, "g2");
}

#[tokio::test(start_paused = true)]
async fn failing_ticks_are_swallowed_and_schedule_survives() {
    let gateway = test_gateway();
    make_ready(&gateway, "u1").await;

    gateway
        .manager
        .schedule("u1", "g1", "tick", 60_000)
        .await
        .unwrap();

    gateway
        .drivers
        .client("u1")
        .fail_sends
        .store(true, Ordering::SeqCst);
    advance(Duration::from_secs(61)).await;

    // The failed tick left no audit record and did not cancel the schedule.
    assert!(gateway.manager.history().await.unwrap().is_empty());

    gateway
        .drivers
        .client("u1")
        .fail_sends
        .store(false, Ordering::SeqCst);
    advance(Duration::from_secs(60)).await;

    assert_eq!(gateway.manager.history().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn ticks_skip_while_session_is_not_ready() {
    let gateway = test_gateway();
    make_ready(&gateway, "u1").await;

    gateway
        .manager
        .schedule("u1", "g1", "tick", 60_000)
        .await
        .unwrap();

    gateway
        .drivers
        .emit(
            "u1",
            chatbridge_driver_protocol::DriverEvent::Disconnected {
                reason: "network timeout".to_string(),
            },
        )
        .await;
    settle().await;

    advance(Duration::from_secs(61)).await;
    assert!(gateway.manager.history().await.unwrap().is_empty());

    // Driver reconnects; the same schedule resumes dispatching.
    gateway
        .drivers
        .emit("u1", chatbridge_driver_protocol::DriverEvent::Ready)
        .await;
    settle().await;

    advance(Duration::from_secs(60)).await;
    assert_eq!(gateway.manager.history().await.unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn schedule_requires_existing_ready_session() {
    let gateway = test_gateway();

    let err = gateway
        .manager
        .schedule("ghost", "g1", "hi", 60_000)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SessionNotFound(_)));

    gateway.manager.start("u1").await.unwrap();
    let err = gateway
        .manager
        .schedule("u1", "g1", "hi", 60_000)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SessionNotReady(_)));
}
