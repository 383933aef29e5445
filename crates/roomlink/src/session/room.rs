//! Room record and its store operations.
//!
//! A room lives at `{rooms_root}/{room_id}` as a JSON object. The initiator
//! creates it and registers a store-side delete that fires if the initiator
//! vanishes before any responder shows up. Every write also refreshes
//! `last_activity`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::errors::SessionError;
use crate::media::IceCandidate;
use crate::observability::record_store_error;
use crate::store::{join_path, DisconnectAction, SignalingStore, StoreError};
use crate::types::{Role, RoomCode, RoomStatus};

/// An offer or answer as stored in the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionRecord {
    pub sdp: String,
    pub timestamp: i64,
    /// On an answer: the `timestamp` of the offer it answers, copied from the
    /// offer record so no two clocks are ever compared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers: Option<i64>,
}

impl DescriptionRecord {
    /// Stamp `sdp` with the current time.
    #[must_use]
    pub fn now(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            timestamp: now_millis(),
            answers: None,
        }
    }
}

/// A candidate as stored under `candidates/{push_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub sdp_mid: String,
    pub sdp_mline_index: u32,
    pub candidate: String,
    pub timestamp: i64,
    pub sender: Role,
}

impl CandidateRecord {
    #[must_use]
    pub fn from_candidate(candidate: IceCandidate, sender: Role) -> Self {
        Self {
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            candidate: candidate.candidate,
            timestamp: now_millis(),
            sender,
        }
    }

    #[must_use]
    pub fn to_candidate(&self) -> IceCandidate {
        IceCandidate {
            sdp_mid: self.sdp_mid.clone(),
            sdp_mline_index: self.sdp_mline_index,
            candidate: self.candidate.clone(),
        }
    }
}

/// Decoded room record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomRecord {
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub status: Option<RoomStatus>,
    #[serde(default)]
    pub initiator_connected: bool,
    #[serde(default)]
    pub receiver_connected: bool,
    #[serde(default)]
    pub last_activity: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<DescriptionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<DescriptionRecord>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub candidates: BTreeMap<String, CandidateRecord>,
}

impl RoomRecord {
    /// A fresh room opened by the initiator.
    #[must_use]
    pub fn fresh(now: i64) -> Self {
        Self {
            created_at: now,
            status: Some(RoomStatus::Available),
            initiator_connected: true,
            receiver_connected: false,
            last_activity: now,
            ping: None,
            offer: None,
            answer: None,
            candidates: BTreeMap::new(),
        }
    }

    /// Status as a string for error reporting.
    #[must_use]
    pub fn status_str(&self) -> &'static str {
        self.status.map_or("missing", |s| s.as_str())
    }
}

/// Current wall-clock time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Presence flag field for a role.
#[must_use]
pub const fn presence_field(role: Role) -> &'static str {
    match role {
        Role::Initiator => "initiator_connected",
        Role::Responder => "receiver_connected",
    }
}

fn store_failure(operation: &'static str) -> impl Fn(StoreError) -> SessionError {
    move |err| {
        record_store_error(operation);
        warn!(
            target: "roomlink.session.room",
            operation,
            error = %err,
            "Store operation failed"
        );
        SessionError::from(err)
    }
}

/// One client's membership in a room.
pub struct RoomSession {
    store: Arc<dyn SignalingStore>,
    room_id: RoomCode,
    role: Role,
    path: String,
    responder_seen: bool,
}

impl RoomSession {
    #[must_use]
    pub fn new(
        store: Arc<dyn SignalingStore>,
        rooms_root: &str,
        room_id: RoomCode,
        role: Role,
    ) -> Self {
        let path = join_path(&[rooms_root, room_id.as_str()]);
        Self {
            store,
            room_id,
            role,
            path,
            responder_seen: false,
        }
    }

    #[must_use]
    pub fn room_id(&self) -> &RoomCode {
        &self.room_id
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Path of the room record.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of a field below the room.
    #[must_use]
    pub fn field_path(&self, field: &str) -> String {
        join_path(&[&self.path, field])
    }

    /// Whether a responder has been observed in this room.
    #[must_use]
    pub fn responder_seen(&self) -> bool {
        self.responder_seen
    }

    /// Create (initiator) or join (responder) the room.
    ///
    /// # Errors
    ///
    /// - `RoomUnavailable` if an initiator finds the room in use, or a
    ///   responder finds it not `available`
    /// - `RoomNotFound` if a responder finds no room
    /// - `SignalingFailure` on store errors
    pub async fn create(&mut self) -> Result<(), SessionError> {
        match self.role {
            Role::Initiator => self.open().await,
            Role::Responder => self.join().await,
        }
    }

    async fn open(&mut self) -> Result<(), SessionError> {
        if let Some(existing) = self.read().await? {
            if existing.status == Some(RoomStatus::Available) && existing.initiator_connected {
                info!(
                    target: "roomlink.session.room",
                    room_id = %self.room_id,
                    "Room already in use"
                );
                return Err(SessionError::RoomUnavailable {
                    room_id: self.room_id.to_string(),
                    status: "in_use".to_string(),
                });
            }
        }

        let record = serde_json::to_value(RoomRecord::fresh(now_millis()))
            .map_err(|e| SessionError::Internal(format!("room encode failed: {e}")))?;
        self.store
            .write(&self.path, record)
            .await
            .map_err(store_failure("write"))?;
        self.responder_seen = false;
        self.register_expiry().await?;

        info!(
            target: "roomlink.session.room",
            room_id = %self.room_id,
            "Room created"
        );
        Ok(())
    }

    async fn join(&mut self) -> Result<(), SessionError> {
        let raw = self
            .store
            .read_once(&self.path)
            .await
            .map_err(store_failure("read"))?;
        let Some(raw) = raw else {
            info!(
                target: "roomlink.session.room",
                room_id = %self.room_id,
                "Room not found"
            );
            return Err(SessionError::RoomNotFound(self.room_id.to_string()));
        };

        let status = match serde_json::from_value::<RoomRecord>(raw) {
            Ok(record) => record.status,
            Err(e) => {
                warn!(
                    target: "roomlink.session.room",
                    room_id = %self.room_id,
                    error = %e,
                    "Undecodable room record"
                );
                None
            }
        };
        if status != Some(RoomStatus::Available) {
            return Err(SessionError::RoomUnavailable {
                room_id: self.room_id.to_string(),
                status: status.map_or("unknown", |s| s.as_str()).to_string(),
            });
        }

        self.update(fields(&[(presence_field(self.role), json!(true))]), "update")
            .await?;
        info!(
            target: "roomlink.session.room",
            room_id = %self.room_id,
            "Joined room"
        );
        Ok(())
    }

    async fn update(
        &self,
        mut fields: Map<String, Value>,
        operation: &'static str,
    ) -> Result<(), SessionError> {
        fields.insert("last_activity".to_string(), json!(now_millis()));
        self.store
            .update(&self.path, fields)
            .await
            .map_err(store_failure(operation))
    }

    /// Write `status`.
    pub async fn set_status(&self, status: RoomStatus) -> Result<(), SessionError> {
        self.update(fields(&[("status", json!(status))]), "update")
            .await
    }

    /// Leave the room.
    ///
    /// An initiator that never saw a responder deletes the room. Everyone else
    /// marks it `disconnected` and leaves removal to store-side expiry.
    pub async fn teardown(&mut self) -> Result<(), SessionError> {
        if self.role == Role::Initiator && !self.responder_seen {
            let responder_in_store = match self.read().await {
                Ok(record) => record.is_some_and(|r| r.receiver_connected),
                Err(_) => false,
            };
            if !responder_in_store {
                debug!(
                    target: "roomlink.session.room",
                    room_id = %self.room_id,
                    "Deleting room with no responder"
                );
                return self
                    .store
                    .delete(&self.path)
                    .await
                    .map_err(store_failure("delete"));
            }
        }

        self.update(
            fields(&[
                ("status", json!(RoomStatus::Disconnected)),
                (presence_field(self.role), json!(false)),
            ]),
            "update",
        )
        .await
    }

    /// Publish an offer and drop any answer from a previous cycle.
    pub async fn send_offer(&self, offer: &DescriptionRecord) -> Result<(), SessionError> {
        self.update(
            fields(&[("offer", json!(offer)), ("answer", Value::Null)]),
            "update",
        )
        .await
    }

    /// Publish an answer.
    pub async fn send_answer(&self, answer: &DescriptionRecord) -> Result<(), SessionError> {
        self.update(fields(&[("answer", json!(answer))]), "update")
            .await
    }

    /// Append a candidate. Returns its push id.
    pub async fn send_candidate(&self, candidate: &CandidateRecord) -> Result<String, SessionError> {
        let key = self
            .store
            .push(&self.field_path("candidates"), json!(candidate))
            .await
            .map_err(store_failure("push"))?;
        self.touch().await?;
        Ok(key)
    }

    pub async fn touch(&self) -> Result<(), SessionError> {
        self.update(Map::new(), "update").await
    }

    /// Liveness probe.
    pub async fn probe(&self) -> Result<(), SessionError> {
        self.update(fields(&[("ping", json!(now_millis()))]), "update")
            .await
    }

    /// Read and decode the room.
    ///
    /// # Errors
    ///
    /// `SignalingFailure` on store errors or an undecodable record.
    pub async fn read(&self) -> Result<Option<RoomRecord>, SessionError> {
        let raw = self
            .store
            .read_once(&self.path)
            .await
            .map_err(store_failure("read"))?;
        raw.map(|value| {
            serde_json::from_value(value).map_err(|e| {
                SessionError::SignalingFailure(format!("malformed room record: {e}"))
            })
        })
        .transpose()
    }

    /// Re-write this role's presence flag.
    pub async fn advertise_presence(&self) -> Result<(), SessionError> {
        self.update(fields(&[(presence_field(self.role), json!(true))]), "update")
            .await
    }

    /// Responder observed: keep the room past an initiator disconnect.
    pub async fn cancel_expiry(&mut self) -> Result<(), SessionError> {
        self.responder_seen = true;
        self.store
            .cancel_on_disconnect(&self.path)
            .await
            .map_err(store_failure("on_disconnect"))
    }

    /// Arm the store-side delete if no responder has been seen.
    pub async fn register_expiry(&self) -> Result<(), SessionError> {
        if self.role != Role::Initiator || self.responder_seen {
            return Ok(());
        }
        self.store
            .on_disconnect(&self.path, DisconnectAction::Delete)
            .await
            .map_err(store_failure("on_disconnect"))
    }
}

fn fields(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn room(store: &MemoryStore, role: Role) -> (RoomSession, crate::store::MemoryClient) {
        let client = store.client();
        let session = RoomSession::new(
            Arc::new(client.clone()),
            "rooms",
            RoomCode::parse("AB12CD").unwrap(),
            role,
        );
        (session, client)
    }

    #[tokio::test]
    async fn test_initiator_creates_fresh_room() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();

        let record = initiator.read().await.unwrap().unwrap();
        assert_eq!(record.status, Some(RoomStatus::Available));
        assert!(record.initiator_connected);
        assert!(!record.receiver_connected);
        assert!(record.offer.is_none());
    }

    #[tokio::test]
    async fn test_initiator_rejects_room_in_use() {
        let store = MemoryStore::new();
        let (mut first, _) = room(&store, Role::Initiator);
        first.create().await.unwrap();

        let (mut second, _) = room(&store, Role::Initiator);
        let err = second.create().await.unwrap_err();
        assert!(matches!(err, SessionError::RoomUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_initiator_replaces_stale_room() {
        let store = MemoryStore::new();
        let (mut first, _) = room(&store, Role::Initiator);
        first.create().await.unwrap();
        first
            .send_offer(&DescriptionRecord::now("v=0 old"))
            .await
            .unwrap();
        first.cancel_expiry().await.unwrap();
        first.teardown().await.unwrap();

        let (mut second, _) = room(&store, Role::Initiator);
        second.create().await.unwrap();
        let record = second.read().await.unwrap().unwrap();
        assert!(record.offer.is_none());
        assert_eq!(record.status, Some(RoomStatus::Available));
    }

    #[tokio::test]
    async fn test_responder_join_rejections() {
        let store = MemoryStore::new();
        let (mut responder, _) = room(&store, Role::Responder);
        assert_eq!(
            responder.create().await.unwrap_err(),
            SessionError::RoomNotFound("AB12CD".to_string())
        );

        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        initiator.set_status(RoomStatus::Disconnected).await.unwrap();
        assert_eq!(
            responder.create().await.unwrap_err(),
            SessionError::RoomUnavailable {
                room_id: "AB12CD".to_string(),
                status: "disconnected".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_responder_join_marks_presence() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        let (mut responder, _) = room(&store, Role::Responder);
        responder.create().await.unwrap();

        let record = initiator.read().await.unwrap().unwrap();
        assert!(record.receiver_connected);
    }

    #[tokio::test]
    async fn test_expiry_deletes_room_until_cancelled() {
        let store = MemoryStore::new();
        let (mut initiator, client) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        client.drop_connection();
        assert_eq!(store.snapshot("rooms/AB12CD"), None);

        let (mut initiator, client) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        initiator.cancel_expiry().await.unwrap();
        client.drop_connection();
        assert!(store.snapshot("rooms/AB12CD").is_some());
    }

    #[tokio::test]
    async fn test_teardown_without_responder_deletes_room() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        initiator.teardown().await.unwrap();
        assert_eq!(store.snapshot("rooms/AB12CD"), None);
    }

    #[tokio::test]
    async fn test_teardown_with_responder_in_store_marks_disconnected() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        let (mut responder, _) = room(&store, Role::Responder);
        responder.create().await.unwrap();

        // Responder never observed locally, but present in the store.
        initiator.teardown().await.unwrap();
        let record = responder.read().await.unwrap().unwrap();
        assert_eq!(record.status, Some(RoomStatus::Disconnected));
        assert!(!record.initiator_connected);
    }

    #[tokio::test]
    async fn test_offer_clears_previous_answer() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        initiator
            .send_answer(&DescriptionRecord::now("v=0 answer"))
            .await
            .unwrap();
        initiator
            .send_offer(&DescriptionRecord::now("v=0 offer"))
            .await
            .unwrap();

        let record = initiator.read().await.unwrap().unwrap();
        assert!(record.answer.is_none());
        assert_eq!(record.offer.unwrap().sdp, "v=0 offer");
    }

    #[tokio::test]
    async fn test_candidates_append_with_sender() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();

        let candidate = IceCandidate {
            sdp_mid: "0".to_string(),
            sdp_mline_index: 0,
            candidate: "candidate:1 1 udp 1 127.0.0.1 5000 typ host".to_string(),
        };
        let first = initiator
            .send_candidate(&CandidateRecord::from_candidate(candidate.clone(), Role::Initiator))
            .await
            .unwrap();
        let second = initiator
            .send_candidate(&CandidateRecord::from_candidate(candidate, Role::Initiator))
            .await
            .unwrap();
        assert!(first < second);

        let record = initiator.read().await.unwrap().unwrap();
        assert_eq!(record.candidates.len(), 2);
        assert!(record
            .candidates
            .values()
            .all(|c| c.sender == Role::Initiator));
    }

    #[tokio::test]
    async fn test_probe_writes_ping() {
        let store = MemoryStore::new();
        let (mut initiator, _) = room(&store, Role::Initiator);
        initiator.create().await.unwrap();
        initiator.probe().await.unwrap();
        assert!(initiator.read().await.unwrap().unwrap().ping.is_some());
    }

    #[tokio::test]
    async fn test_store_failures_surface_as_signaling_failure() {
        let store = MemoryStore::new();
        let (mut initiator, client) = room(&store, Role::Initiator);
        client.drop_connection();
        let err = initiator.create().await.unwrap_err();
        assert!(matches!(err, SessionError::SignalingFailure(_)));
        assert!(err.is_retryable());
    }
}
