//! Integration tests for liveness probing of quiet rooms.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use roomlink::session::SessionEvent;
use roomlink::store::{MemoryStore, SignalingStore};
use roomlink::{ConnectionState, Role, RoomStatus};
use roomlink_test_utils::{
    eventually, room_record, FaultyStore, MockMediaEngine, StoreOp, TestPeer, TestRoom,
    WaitCategory,
};
use serde_json::json;

async fn seeded_responder(
    store: &MemoryStore,
    room: &TestRoom,
) -> (TestPeer, Arc<FaultyStore<roomlink::store::MemoryClient>>) {
    room.seed(store, room_record(RoomStatus::Available)).await;
    let client = store.client();
    let faulty = Arc::new(FaultyStore::new(client.clone()));
    let peer = TestPeer::spawn_with(
        room,
        Role::Responder,
        client,
        faulty.clone(),
        Arc::new(MockMediaEngine::new()),
    );
    peer.handle.connect().await.unwrap();
    (peer, faulty)
}

#[tokio::test(start_paused = true)]
async fn test_active_room_is_not_probed() {
    let store = MemoryStore::new();
    let room = TestRoom::new("BUSY22");
    let (peer, _faulty) = seeded_responder(&store, &room).await;

    // Under the 30s timeout; ticks at 10s and 20s find nothing stale.
    tokio::time::sleep(Duration::from_secs(25)).await;
    assert_eq!(store.snapshot(&room.field("ping")), None);
    assert_eq!(peer.handle.connection_state(), ConnectionState::WatchingRoom);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_room_gets_probed() {
    let store = MemoryStore::new();
    let room = TestRoom::new("QUIET1");
    let (peer, _faulty) = seeded_responder(&store, &room).await;

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(store.snapshot(&room.field("ping")).is_some());
    assert_eq!(peer.handle.connection_state(), ConnectionState::WatchingRoom);
    assert!(!peer.listener.contains(&SessionEvent::RemoteHangup));
}

#[tokio::test(start_paused = true)]
async fn test_room_activity_postpones_the_probe() {
    let store = MemoryStore::new();
    let room = TestRoom::new("CHATTY");
    let (_peer, _faulty) = seeded_responder(&store, &room).await;
    let remote = store.client();

    // A watched field changes every 20s, so the room never goes quiet.
    for n in 0..4 {
        tokio::time::sleep(Duration::from_secs(20)).await;
        remote
            .write(&room.field("initiator_connected"), json!(n % 2 == 1))
            .await
            .unwrap();
    }
    assert_eq!(store.snapshot(&room.field("ping")), None);
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_hands_off_to_reconnection() {
    let store = MemoryStore::new();
    let room = TestRoom::new("PROBE1");
    let (peer, faulty) = seeded_responder(&store, &room).await;
    faulty.fail(StoreOp::Write);

    tokio::time::sleep(Duration::from_secs(45)).await;
    assert!(peer.listener.contains(&SessionEvent::Reconnecting {
        attempt: 1,
        max_attempts: 5
    }));
    assert_eq!(peer.handle.connection_state(), ConnectionState::Reconnecting);

    faulty.recover(StoreOp::Write);
    eventually(WaitCategory::Reconnection, || async {
        peer.listener.contains(&SessionEvent::Reconnected)
    })
    .await
    .unwrap();
    assert_eq!(peer.handle.connection_state(), ConnectionState::WatchingRoom);
}

#[tokio::test(start_paused = true)]
async fn test_disconnected_status_is_reported_once_across_liveness_reads() {
    let store = MemoryStore::new();
    let room = TestRoom::new("HANGUP");
    let (peer, faulty) = seeded_responder(&store, &room).await;

    store
        .client()
        .write(&room.field("status"), json!("disconnected"))
        .await
        .unwrap();
    eventually(WaitCategory::Negotiation, || async {
        peer.listener.contains(&SessionEvent::RemoteHangup)
    })
    .await
    .unwrap();

    // Every later stale tick reads the flag back instead of probing.
    let writes = faulty.count("update");
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(peer.listener.count(&SessionEvent::RemoteHangup), 1);
    assert!(faulty.count("read_once") >= 2);
    assert_eq!(faulty.count("update"), writes);
    assert_eq!(store.snapshot(&room.field("ping")), None);
}
