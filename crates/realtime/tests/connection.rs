use std::sync::Arc;
use std::time::Duration;

use api::{SharedTokenStore, StaticTokenProvider, TokenProvider};
use realtime::{
    ConnectionError, ConnectionManager, ConnectionState, InMemoryTransport, ReconnectPolicy,
    TransportError,
};

fn manager(transport: &InMemoryTransport, tokens: Arc<dyn TokenProvider>) -> ConnectionManager {
    ConnectionManager::new(Arc::new(transport.clone()), tokens, ReconnectPolicy::default())
}

fn signed_in() -> Arc<dyn TokenProvider> {
    Arc::new(StaticTokenProvider::new("tok-1"))
}

/// Let spawned reader/reconnect tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn connect_establishes_link_with_token() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());

    connection.connect().await;

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(transport.tokens_seen(), vec!["tok-1".to_owned()]);
    assert!(connection.current_link().is_some());
    assert_eq!(connection.status().last_error, None);
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_open_once() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());

    tokio::join!(
        connection.connect(),
        connection.connect(),
        connection.connect(),
        connection.connect(),
    );

    assert_eq!(transport.open_count(), 1);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_while_connected_is_a_no_op() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());

    connection.connect().await;
    connection.connect().await;

    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn missing_token_fails_without_opening() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, Arc::new(StaticTokenProvider::signed_out()));

    connection.connect().await;

    let status = connection.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.last_error, Some(ConnectionError::MissingCredential));
    assert_eq!(transport.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn rejected_token_is_not_retried() {
    let transport = InMemoryTransport::new();
    transport.fail_next_open(TransportError::Unauthorized("expired".into()));
    let connection = manager(&transport, signed_in());

    connection.connect().await;
    tokio::time::sleep(Duration::from_secs(120)).await;

    let status = connection.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(
        status.last_error,
        Some(ConnectionError::Rejected("expired".into()))
    );
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_connect_can_be_retried() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());

    let cancelled = tokio::time::timeout(Duration::ZERO, connection.connect()).await;
    assert!(cancelled.is_err());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connection.status().last_error, None);

    connection.connect().await;
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(transport.link_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn credential_rejected_while_reconnecting_stops_retrying() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());
    connection.connect().await;

    transport.fail_next_open(TransportError::Unauthorized("revoked".into()));
    transport.sever(0);
    settle().await;
    assert_eq!(connection.state(), ConnectionState::Reconnecting);

    tokio::time::sleep(Duration::from_millis(2100)).await;
    let status = connection.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(
        status.last_error,
        Some(ConnectionError::Rejected("revoked".into()))
    );
    assert_eq!(transport.open_count(), 2);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(connection.state(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn connect_after_sign_in_clears_error() {
    let transport = InMemoryTransport::new();
    let tokens = SharedTokenStore::new();
    let connection = manager(&transport, Arc::new(tokens.clone()));

    connection.connect().await;
    assert_eq!(connection.status().last_error, Some(ConnectionError::MissingCredential));

    tokens.set("fresh");
    connection.connect().await;

    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(connection.status().last_error, None);
    assert_eq!(transport.tokens_seen(), vec!["fresh".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn lost_link_reconnects_after_first_delay() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());
    connection.connect().await;

    transport.sever(0);
    settle().await;
    assert_eq!(connection.state(), ConnectionState::Reconnecting);
    assert!(connection.current_link().is_none());

    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(transport.open_count(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnects_follow_backoff_schedule() {
    let transport = InMemoryTransport::new();
    transport.fail_next_open(TransportError::Network("refused".into()));
    transport.fail_next_open(TransportError::Network("refused".into()));
    let connection = manager(&transport, signed_in());

    connection.connect().await;
    assert_eq!(connection.state(), ConnectionState::Reconnecting);
    assert_eq!(transport.open_count(), 1);

    // First retry after 2 s fails, second after a further 5 s succeeds.
    tokio::time::sleep(Duration::from_millis(2010)).await;
    assert_eq!(transport.open_count(), 2);
    assert_eq!(connection.state(), ConnectionState::Reconnecting);

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(transport.open_count(), 2);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(transport.open_count(), 3);
    assert_eq!(connection.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());
    connection.connect().await;

    transport.sever(0);
    settle().await;
    assert_eq!(connection.state(), ConnectionState::Reconnecting);

    connection.disconnect();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(transport.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());

    connection.disconnect();
    connection.connect().await;
    connection.disconnect();
    connection.disconnect();

    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert!(connection.current_link().is_none());
}

#[tokio::test(start_paused = true)]
async fn frames_after_disconnect_are_not_delivered() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());
    let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
    let sink = Arc::clone(&seen);
    connection.on_frame(move |frame| sink.lock().unwrap().push(frame.to_owned()));

    connection.connect().await;
    assert!(transport.push_frame(0, "one"));
    settle().await;
    connection.disconnect();
    transport.push_frame(0, "two");
    settle().await;

    assert_eq!(*seen.lock().unwrap(), vec!["one".to_owned()]);
}

#[tokio::test(start_paused = true)]
async fn status_watch_observes_transitions() {
    let transport = InMemoryTransport::new();
    let connection = manager(&transport, signed_in());
    let mut status = connection.watch_status();

    connection.connect().await;
    status.changed().await.unwrap();
    assert_eq!(status.borrow_and_update().state, ConnectionState::Connected);

    connection.disconnect();
    status.changed().await.unwrap();
    assert_eq!(status.borrow().state, ConnectionState::Disconnected);
}
