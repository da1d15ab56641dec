//! Reconnection behavior of the connection manager
//!
//! Drives the manager through a mock connector on a paused clock, so every
//! backoff delay is checked to the millisecond.

use std::time::Duration;
use wsrelay::manager::{
    ConnectionManager, ConnectionState, Handler, ReadyState, ReconnectConfig,
};
use wsrelay::testing::{settle, MockConnector};

/// Assert the next reconnect opens a link exactly `delay` from now
async fn expect_reconnect_after(connector: &MockConnector, delay: Duration) {
    let before = connector.open_count();

    tokio::time::sleep(delay - Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(
        connector.open_count(),
        before,
        "reconnected before {}ms",
        delay.as_millis()
    );

    tokio::time::sleep(Duration::from_millis(1)).await;
    settle().await;
    assert_eq!(
        connector.open_count(),
        before + 1,
        "did not reconnect after {}ms",
        delay.as_millis()
    );
}

#[tokio::test(start_paused = true)]
async fn test_backoff_schedule_without_opens() {
    // Arrange
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    settle().await;

    // Act / Assert: 1s, 2s, 4s, 8s, 16s
    for (index, expected_ms) in [1000u64, 2000, 4000, 8000, 16000].into_iter().enumerate() {
        assert!(connector.simulate_close(index, Some(1006), "abnormal"));
        settle().await;

        assert_eq!(
            manager.state(),
            ConnectionState::Reconnecting {
                attempt: index as u32 + 1,
                delay: Duration::from_millis(expected_ms)
            }
        );
        expect_reconnect_after(&connector, Duration::from_millis(expected_ms)).await;
        assert_eq!(manager.reconnect_attempts(), index as u32 + 1);
    }

    // Assert: the sixth close schedules nothing
    assert!(connector.simulate_close(5, Some(1006), "abnormal"));
    settle().await;
    tokio::time::sleep(Duration::from_secs(120)).await;
    settle().await;

    assert_eq!(connector.open_count(), 6);
    assert!(manager.is_given_up());
    assert_eq!(manager.ready_state(), Some(ReadyState::Closed));
    assert_eq!(manager.metrics().reconnects_scheduled, 5);
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_reuses_original_target() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());

    manager.connect("endpoint-A");
    connector.simulate_open(0);
    settle().await;
    assert_eq!(manager.ready_state(), Some(ReadyState::Open));

    connector.simulate_close(0, Some(1001), "going away");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(1000)).await;

    assert_eq!(connector.urls(), vec!["endpoint-A", "endpoint-A"]);
    assert_eq!(manager.state(), ConnectionState::Connecting);
    assert_eq!(manager.ready_state(), Some(ReadyState::Connecting));
}

#[tokio::test(start_paused = true)]
async fn test_successful_open_resets_backoff() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    settle().await;

    // Two failed attempts push the counter to 2
    connector.simulate_close(0, None, "refused");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(1000)).await;
    connector.simulate_close(1, None, "refused");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(2000)).await;
    assert_eq!(manager.reconnect_attempts(), 2);

    // Act: the third link opens, then drops
    connector.simulate_open(2);
    settle().await;
    assert_eq!(manager.reconnect_attempts(), 0);
    connector.simulate_close(2, Some(1006), "abnormal");
    settle().await;

    // Assert: the sequence restarts at 1s
    assert_eq!(
        manager.state(),
        ConnectionState::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(1000)
        }
    );
    expect_reconnect_after(&connector, Duration::from_millis(1000)).await;
}

#[tokio::test(start_paused = true)]
async fn test_exhaustion_after_opens_counts_only_consecutive_failures() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::with_reconnect_config(
        connector.clone(),
        ReconnectConfig {
            max_attempts: 2,
            base_delay_ms: 100,
        },
    );
    manager.connect("endpoint-A");
    connector.simulate_open(0);
    settle().await;

    connector.simulate_close(0, None, "drop");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(100)).await;
    connector.simulate_close(1, None, "drop");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(200)).await;
    connector.simulate_close(2, None, "drop");
    settle().await;

    match manager.state() {
        ConnectionState::GivenUp(reason) => assert!(reason.contains("(2)"), "{reason}"),
        other => panic!("expected GivenUp, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_connect_while_open_is_noop() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());

    manager.connect("endpoint-A");
    connector.simulate_open(0);
    settle().await;

    manager.connect("endpoint-A");
    manager.connect("endpoint-B");
    settle().await;

    assert_eq!(connector.open_count(), 1);
    assert!(!connector.is_dropped(0));
    assert_eq!(manager.url().as_deref(), Some("endpoint-A"));
    assert_eq!(manager.metrics().connect_attempts, 1);
}

#[tokio::test(start_paused = true)]
async fn test_explicit_connect_cancels_pending_reconnect() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    connector.simulate_open(0);
    connector.simulate_close(0, None, "drop");
    settle().await;
    assert!(matches!(manager.state(), ConnectionState::Reconnecting { .. }));

    manager.connect("endpoint-B");
    settle().await;
    assert_eq!(connector.open_count(), 2);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(connector.open_count(), 2);
    assert_eq!(connector.urls(), vec!["endpoint-A", "endpoint-B"]);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    // Arrange: a reconnect is pending
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    connector.simulate_open(0);
    connector.simulate_close(0, Some(1006), "abnormal");
    settle().await;
    assert!(matches!(manager.state(), ConnectionState::Reconnecting { .. }));

    // Act
    manager.disconnect();
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;

    // Assert: the timer never fired
    assert_eq!(connector.open_count(), 1);
    assert_eq!(
        manager.state(),
        ConnectionState::GivenUp("disconnected by caller".to_string())
    );
    assert_eq!(manager.ready_state(), None);
    assert_eq!(manager.reconnect_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_close_schedules_nothing() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.on("foo", Handler::infallible(|_| {}));
    manager.on("*", Handler::infallible(|_| {}));
    manager.connect("endpoint-A");
    connector.simulate_open(0);
    settle().await;

    manager.disconnect();
    assert!(connector.close_requested(0));
    assert_eq!(manager.state(), ConnectionState::Closing);
    assert_eq!(manager.ready_state(), Some(ReadyState::Closing));
    assert_eq!(manager.handler_count("foo"), 0);
    assert_eq!(manager.handler_count("*"), 0);

    connector.simulate_close(0, Some(1000), "normal closure");
    settle().await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;

    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.ready_state(), None);
    assert!(manager.is_given_up());

    // Registrations made afterwards start from empty
    manager.on("foo", Handler::infallible(|_| {}));
    assert_eq!(manager.handler_count("foo"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_open_after_disconnect_is_ignored() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    settle().await;

    manager.disconnect();
    connector.simulate_open(0);
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Closing);
    assert_eq!(manager.ready_state(), Some(ReadyState::Closing));
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_does_not_reconnect() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");
    connector.simulate_open(0);
    connector.simulate_error(0, "tls alert");
    settle().await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(connector.open_count(), 1);
    assert_eq!(manager.metrics().transport_errors, 1);
}

#[tokio::test(start_paused = true)]
async fn test_connect_after_give_up_resumes() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::with_reconnect_config(
        connector.clone(),
        ReconnectConfig {
            max_attempts: 1,
            base_delay_ms: 10,
        },
    );
    manager.connect("endpoint-A");
    connector.simulate_close(0, None, "refused");
    settle().await;
    expect_reconnect_after(&connector, Duration::from_millis(10)).await;
    connector.simulate_close(1, None, "refused");
    settle().await;
    assert!(manager.is_given_up());

    manager.connect("endpoint-A");
    connector.simulate_open(2);
    settle().await;

    assert_eq!(manager.state(), ConnectionState::Open);
    assert_eq!(manager.reconnect_attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_open() {
    let connector = MockConnector::new();
    let manager = ConnectionManager::new(connector.clone());
    manager.connect("endpoint-A");

    let waiter = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.wait_until_open(Duration::from_secs(5)).await })
    };
    settle().await;
    connector.simulate_open(0);

    let result = waiter.await.unwrap();
    assert!(result.is_ok());
}
