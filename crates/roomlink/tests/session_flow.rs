//! Integration tests for the room lifecycle and a full negotiation between two
//! sessions sharing one in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use roomlink::session::SessionEvent;
use roomlink::store::MemoryStore;
use roomlink::{ConnectionState, Role, RoomStatus, SessionError};
use roomlink_test_utils::{eventually, room_record, TestPeer, TestRoom, WaitCategory};

fn is_active(state: ConnectionState) -> bool {
    matches!(
        state,
        ConnectionState::WatchingRoom | ConnectionState::Negotiating | ConnectionState::Connected
    )
}

async fn pair(store: &MemoryStore, room: &TestRoom) -> (TestPeer, TestPeer) {
    let initiator = TestPeer::spawn(store, room, Role::Initiator);
    initiator.handle.connect().await.unwrap();
    let responder = TestPeer::spawn(store, room, Role::Responder);
    responder.handle.connect().await.unwrap();
    (initiator, responder)
}

async fn wait_connected(peer: &TestPeer) {
    eventually(WaitCategory::Negotiation, || async {
        peer.listener.contains(&SessionEvent::ConnectionEstablished)
    })
    .await
    .unwrap();
}

// ============================================================================
// Room lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_then_join_reaches_watching_room() {
    for code in ["AB12", "ab12CD", "Z9Y8X7W6V5U4"] {
        let store = MemoryStore::new();
        let room = TestRoom::new(code);
        let (initiator, responder) = pair(&store, &room).await;

        assert!(is_active(initiator.handle.connection_state()));
        assert!(is_active(responder.handle.connection_state()));

        initiator.handle.disconnect().await.unwrap();
        responder.handle.disconnect().await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_join_nonexistent_room_is_room_not_found() {
    let store = MemoryStore::new();
    let room = TestRoom::new("NOPE42");
    let responder = TestPeer::spawn(&store, &room, Role::Responder);

    let err = responder.handle.connect().await.unwrap_err();
    assert_eq!(err, SessionError::RoomNotFound("NOPE42".to_string()));
    assert!(err.is_join_rejection());
    assert!(!err.is_retryable());
    assert_eq!(
        responder.handle.connection_state(),
        ConnectionState::Disconnected
    );
}

#[tokio::test(start_paused = true)]
async fn test_join_disconnected_room_is_unavailable() {
    let store = MemoryStore::new();
    let room = TestRoom::new("GONE12");
    room.seed(&store, room_record(RoomStatus::Disconnected)).await;

    let responder = TestPeer::spawn(&store, &room, Role::Responder);
    let err = responder.handle.connect().await.unwrap_err();
    assert_eq!(
        err,
        SessionError::RoomUnavailable {
            room_id: "GONE12".to_string(),
            status: "disconnected".to_string(),
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_initiator_is_rejected() {
    let store = MemoryStore::new();
    let room = TestRoom::new("BUSY01");
    let first = TestPeer::spawn(&store, &room, Role::Initiator);
    first.handle.connect().await.unwrap();

    let second = TestPeer::spawn(&store, &room, Role::Initiator);
    let err = second.handle.connect().await.unwrap_err();
    assert!(matches!(err, SessionError::RoomUnavailable { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_initiator_alone_deletes_room_on_disconnect() {
    let store = MemoryStore::new();
    let room = TestRoom::new("SOLO01");
    let initiator = TestPeer::spawn(&store, &room, Role::Initiator);
    initiator.handle.connect().await.unwrap();
    assert!(store.snapshot(&room.path()).is_some());

    initiator.handle.disconnect().await.unwrap();
    assert_eq!(store.snapshot(&room.path()), None);
}

#[tokio::test(start_paused = true)]
async fn test_initiator_transport_drop_expires_unjoined_room() {
    let store = MemoryStore::new();
    let room = TestRoom::new("DROP01");
    let initiator = TestPeer::spawn(&store, &room, Role::Initiator);
    initiator.handle.connect().await.unwrap();

    initiator.client.set_reachable(false);
    initiator.client.drop_connection();
    assert_eq!(store.snapshot(&room.path()), None);
}

// ============================================================================
// Negotiation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_end_to_end_negotiation_reports_once_each() {
    let store = MemoryStore::new();
    let room = TestRoom::new("AB12CD");
    let (initiator, responder) = pair(&store, &room).await;

    wait_connected(&initiator).await;
    wait_connected(&responder).await;
    eventually(WaitCategory::Negotiation, || async {
        initiator.listener.received_candidates().len() == 1
            && responder.listener.received_candidates().len() == 1
    })
    .await
    .unwrap();

    // Let any stray deliveries land before counting.
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(
        initiator.handle.connection_state(),
        ConnectionState::Connected
    );
    assert_eq!(
        responder.handle.connection_state(),
        ConnectionState::Connected
    );
    for peer in [&initiator, &responder] {
        assert_eq!(peer.listener.count(&SessionEvent::ConnectionEstablished), 1);
        assert_eq!(peer.listener.count(&SessionEvent::RemoteConnected), 1);
    }
    assert_eq!(responder.listener.count(&SessionEvent::OfferReceived), 1);
    assert_eq!(initiator.listener.count(&SessionEvent::AnswerReceived), 1);
    assert_eq!(initiator.listener.count(&SessionEvent::OfferReceived), 0);
    assert_eq!(responder.listener.count(&SessionEvent::AnswerReceived), 0);

    let record = store.snapshot(&room.path()).unwrap();
    assert!(record.get("offer").is_some());
    assert!(record.get("answer").is_some());
    assert_eq!(
        record.get("candidates").and_then(|c| c.as_object()).map(|c| c.len()),
        Some(2)
    );
}

#[tokio::test(start_paused = true)]
async fn test_restart_negotiation_runs_a_fresh_cycle() {
    let store = MemoryStore::new();
    let room = TestRoom::new("AGAIN1");
    let (initiator, responder) = pair(&store, &room).await;
    wait_connected(&initiator).await;
    wait_connected(&responder).await;

    initiator.handle.restart_negotiation().await.unwrap();
    eventually(WaitCategory::Negotiation, || async {
        initiator.listener.count(&SessionEvent::ConnectionEstablished) == 2
            && responder.listener.count(&SessionEvent::ConnectionEstablished) == 2
    })
    .await
    .unwrap();
    assert_eq!(responder.listener.count(&SessionEvent::OfferReceived), 2);
}

// ============================================================================
// Hangup and teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_peer_status_disconnected_emits_exactly_one_hangup() {
    let store = MemoryStore::new();
    let room = TestRoom::new("BYE123");
    let (initiator, responder) = pair(&store, &room).await;
    wait_connected(&responder).await;

    initiator
        .handle
        .set_status(RoomStatus::Disconnected)
        .await
        .unwrap();
    initiator.handle.disconnect().await.unwrap();

    eventually(WaitCategory::Negotiation, || async {
        responder.listener.contains(&SessionEvent::RemoteHangup)
    })
    .await
    .unwrap();

    // Liveness ticks read the same status back once the room goes quiet.
    tokio::time::sleep(Duration::from_secs(90)).await;
    assert_eq!(responder.listener.count(&SessionEvent::RemoteHangup), 1);
    assert_eq!(initiator.listener.count(&SessionEvent::RemoteHangup), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_is_safe_from_any_state() {
    let store = MemoryStore::new();
    let room = TestRoom::new("SAFE01");

    // Never connected.
    let idle = TestPeer::spawn(&store, &room, Role::Initiator);
    idle.handle.disconnect().await.unwrap();
    idle.handle.disconnect().await.unwrap();

    // Failed join.
    let rejected = TestPeer::spawn(&store, &TestRoom::new("NONE01"), Role::Responder);
    assert!(rejected.handle.connect().await.is_err());
    rejected.handle.disconnect().await.unwrap();

    // Connected pair.
    let (initiator, responder) = pair(&store, &room).await;
    wait_connected(&responder).await;
    eventually(WaitCategory::Negotiation, || async {
        initiator.listener.contains(&SessionEvent::RemoteConnected)
    })
    .await
    .unwrap();
    responder.handle.disconnect().await.unwrap();
    initiator.handle.disconnect().await.unwrap();
    responder.task.await.unwrap();
    initiator.task.await.unwrap();

    eventually(WaitCategory::Mailbox, || async { store.watcher_count() == 0 })
        .await
        .unwrap();
    let record = store.snapshot(&room.path()).unwrap();
    assert_eq!(record.get("status"), Some(&serde_json::json!("disconnected")));
}

#[tokio::test(start_paused = true)]
async fn test_commands_after_disconnect_report_session_closed() {
    let store = MemoryStore::new();
    let room = TestRoom::new("DONE01");
    let initiator = TestPeer::spawn(&store, &room, Role::Initiator);
    initiator.handle.connect().await.unwrap();
    initiator.handle.disconnect().await.unwrap();

    assert_eq!(
        initiator.handle.connect().await,
        Err(SessionError::SessionClosed)
    );
    assert_eq!(
        initiator.handle.connection_state(),
        ConnectionState::Disconnected
    );
}
