//! Pre-configured fixtures for session tests.
//!
//! Provides:
//! - Room codes and room records to seed a store with
//! - Description and candidate payloads as they appear in the store
//! - `TestPeer`, a spawned session with its store client and listener

use std::sync::Arc;

use roomlink::media::{LoopbackEngine, MediaEngine};
use roomlink::session::room::{now_millis, RoomRecord};
use roomlink::store::{MemoryClient, MemoryStore, SignalingStore};
use roomlink::{Config, Role, RoomCode, RoomStatus, SessionHandle, SignalingSession};
use serde_json::{json, Value};
use tokio::task::JoinHandle;

use crate::RecordingListener;

/// Test room fixture.
#[derive(Debug, Clone)]
pub struct TestRoom {
    pub code: RoomCode,
    pub config: Config,
}

impl TestRoom {
    /// Room with the given code and default configuration.
    pub fn new(code: &str) -> Self {
        Self {
            code: RoomCode::parse(code).unwrap(),
            config: Config::default(),
        }
    }

    /// Room with a generated code.
    #[must_use]
    pub fn random() -> Self {
        Self {
            code: RoomCode::generate(),
            config: Config::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Store path of the room record.
    pub fn path(&self) -> String {
        format!("{}/{}", self.config.rooms_root, self.code)
    }

    /// Store path of a room field.
    pub fn field(&self, field: &str) -> String {
        format!("{}/{field}", self.path())
    }

    /// Write `record` at the room path through a throwaway client.
    pub async fn seed(&self, store: &MemoryStore, record: Value) {
        store.client().write(&self.path(), record).await.unwrap();
    }
}

/// A freshly created room record with `status`.
pub fn room_record(status: RoomStatus) -> Value {
    let mut record = RoomRecord::fresh(now_millis());
    record.status = Some(status);
    serde_json::to_value(record).unwrap()
}

/// Offer or answer payload as stored in the room.
pub fn description_payload(sdp: &str, timestamp: i64) -> Value {
    json!({ "sdp": sdp, "timestamp": timestamp })
}

/// Answer payload naming the offer (by its timestamp) it answers.
pub fn answer_payload(sdp: &str, timestamp: i64, answers: i64) -> Value {
    json!({ "sdp": sdp, "timestamp": timestamp, "answers": answers })
}

/// Candidate payload as stored under `candidates`.
pub fn candidate_payload(n: u32, sender: Role) -> Value {
    json!({
        "sdp_mid": "0",
        "sdp_mline_index": 0,
        "candidate": format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
        "timestamp": now_millis(),
        "sender": sender,
    })
}

/// A spawned session plus the pieces tests poke at.
pub struct TestPeer {
    pub handle: SessionHandle,
    pub task: JoinHandle<()>,
    pub listener: Arc<RecordingListener>,
    /// The store client the session talks through.
    pub client: MemoryClient,
}

impl TestPeer {
    /// Spawn a session on a fresh client with a loopback engine.
    pub fn spawn(store: &MemoryStore, room: &TestRoom, role: Role) -> Self {
        let client = store.client();
        let engine = Arc::new(LoopbackEngine::new(room.config.ice_servers.clone()));
        Self::spawn_with(room, role, client.clone(), Arc::new(client), engine)
    }

    /// Spawn with explicit store and engine. `client` is the underlying
    /// connection `signaling` talks through.
    pub fn spawn_with(
        room: &TestRoom,
        role: Role,
        client: MemoryClient,
        signaling: Arc<dyn SignalingStore>,
        engine: Arc<dyn MediaEngine>,
    ) -> Self {
        let listener = Arc::new(RecordingListener::new());
        let (handle, task) = SignalingSession::spawn(
            room.config.clone(),
            room.code.clone(),
            role,
            signaling,
            engine,
            Arc::clone(&listener) as Arc<dyn roomlink::session::SessionListener>,
        );
        Self {
            handle,
            task,
            listener,
            client,
        }
    }
}
