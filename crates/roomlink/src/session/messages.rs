//! Session mailbox messages.

use serde_json::Value;
use tokio::sync::oneshot;

use crate::errors::SessionError;
use crate::media::IceCandidate;
use crate::types::{ConnectionState, Role, RoomCode, RoomStatus};

use super::negotiation::NegotiationPhase;
use super::room::{CandidateRecord, DescriptionRecord};

/// Messages handled by the session actor.
#[derive(Debug)]
pub enum SessionMessage {
    /// Create or join the room and start watching it.
    Connect {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Snapshot of the session.
    GetStatus {
        respond_to: oneshot::Sender<SessionStatus>,
    },

    /// Relay a locally gathered candidate.
    SendCandidate {
        candidate: IceCandidate,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Start a fresh offer (initiator).
    RestartNegotiation {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Write the room status.
    SetStatus {
        status: RoomStatus,
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Tear down and stop.
    Disconnect {
        respond_to: oneshot::Sender<Result<(), SessionError>>,
    },

    /// Room watch delivery, tagged with the watch generation.
    Room { generation: u64, event: RoomEvent },

    /// Store connection presence changed.
    StorePresence { connected: bool },

    /// Candidate gathered by the media engine.
    LocalCandidate { candidate: IceCandidate },
}

/// A change observed on the room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    Offer(Option<Value>),
    Answer(Option<Value>),
    Candidate { key: String, value: Value },
    Status(Option<Value>),
    RemotePresence(Option<Value>),
}

impl RoomEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomEvent::Offer(_) => "offer",
            RoomEvent::Answer(_) => "answer",
            RoomEvent::Candidate { .. } => "candidate",
            RoomEvent::Status(_) => "status",
            RoomEvent::RemotePresence(_) => "remote_presence",
        }
    }
}

/// A store write waiting to be (re)sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Offer(DescriptionRecord),
    Answer(DescriptionRecord),
    Candidate(CandidateRecord),
    Status(RoomStatus),
}

impl Outbound {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Outbound::Offer(_) => "offer",
            Outbound::Answer(_) => "answer",
            Outbound::Candidate(_) => "candidate",
            Outbound::Status(_) => "status",
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub room_id: RoomCode,
    pub role: Role,
    pub state: ConnectionState,
    pub phase: NegotiationPhase,
    /// Attempts made in the active reconnection loop.
    pub reconnect_attempts: u32,
    /// Remote candidates waiting for the remote description.
    pub pending_candidates: usize,
    /// Writes queued for the next reconnection.
    pub pending_outbound: usize,
    /// Room events held for replay after reconnection.
    pub buffered_events: usize,
    pub watch_generation: u64,
}
