//! Common data types for roomlink sessions.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::SessionError;

/// Minimum room code length.
pub const ROOM_CODE_MIN_LEN: usize = 4;

/// Maximum room code length.
pub const ROOM_CODE_MAX_LEN: usize = 12;

/// Length of generated room codes.
pub const GENERATED_ROOM_CODE_LEN: usize = 6;

/// Short alphanumeric code identifying a room (4-12 chars, case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validate and wrap a room code exactly as supplied.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidRoomCode` if the code is not 4-12 ASCII
    /// alphanumeric characters.
    pub fn parse(code: impl Into<String>) -> Result<Self, SessionError> {
        let code = code.into();
        let len_ok = (ROOM_CODE_MIN_LEN..=ROOM_CODE_MAX_LEN).contains(&code.len());
        if len_ok && code.chars().all(|c| c.is_ascii_alphanumeric()) {
            Ok(Self(code))
        } else {
            Err(SessionError::InvalidRoomCode(code))
        }
    }

    /// Generate a random room code.
    #[must_use]
    pub fn generate() -> Self {
        let code: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(GENERATED_ROOM_CODE_LEN)
            .map(char::from)
            .collect();
        Self(code)
    }

    /// The code as supplied.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Which side of the rendezvous this client plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Creates the room and sends the offer.
    Initiator,
    /// Joins an existing room and answers.
    Responder,
}

impl Role {
    /// Returns the role as a string for log fields and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Role::Initiator => "initiator",
            Role::Responder => "responder",
        }
    }

    /// The opposite role.
    #[must_use]
    pub const fn peer(&self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Room status flag shared through the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Room is open for a responder to join.
    Available,
    /// A peer hung up.
    Disconnected,
}

impl RoomStatus {
    /// Wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            RoomStatus::Available => "available",
            RoomStatus::Disconnected => "disconnected",
        }
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-local connection state. Never shared across peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not started, or torn down.
    Disconnected,
    /// Creating or joining the room.
    ConnectingToStore,
    /// Room watches registered, negotiation idle.
    WatchingRoom,
    /// Offer/answer exchange in progress.
    Negotiating,
    /// Offer/answer exchange complete.
    Connected,
    /// Store connection lost; backoff retries in progress.
    Reconnecting,
    /// Reconnection budget exhausted. Terminal.
    Failed,
}

impl ConnectionState {
    /// Whether negotiation messages are accepted in this state.
    #[must_use]
    pub const fn accepts_signals(&self) -> bool {
        matches!(
            self,
            ConnectionState::WatchingRoom
                | ConnectionState::Negotiating
                | ConnectionState::Connected
        )
    }

    /// Returns the state as a string for log fields.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::ConnectingToStore => "connecting_to_store",
            ConnectionState::WatchingRoom => "watching_room",
            ConnectionState::Negotiating => "negotiating",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_accepts_valid_codes() {
        for code in ["AB12", "AB12CD", "abcdEFGH1234", "0000"] {
            let parsed = RoomCode::parse(code).unwrap();
            assert_eq!(parsed.as_str(), code);
        }
    }

    #[test]
    fn test_room_code_rejects_invalid_codes() {
        for code in ["", "AB1", "ABCDEFGHIJKLM", "AB 12", "AB-12", "ÄB12", "room/1"] {
            let err = RoomCode::parse(code).unwrap_err();
            assert!(matches!(err, SessionError::InvalidRoomCode(_)), "{code}");
        }
    }

    #[test]
    fn test_room_code_is_case_sensitive() {
        let upper = RoomCode::parse("AB12CD").unwrap();
        let lower = RoomCode::parse("ab12cd").unwrap();
        assert_ne!(upper, lower);
    }

    #[test]
    fn test_generated_room_code_is_valid() {
        let code = RoomCode::generate();
        assert_eq!(code.as_str().len(), GENERATED_ROOM_CODE_LEN);
        assert!(RoomCode::parse(code.as_str()).is_ok());
    }

    #[test]
    fn test_room_code_serde_validates() {
        let ok: RoomCode = serde_json::from_str("\"AB12CD\"").unwrap();
        assert_eq!(ok.as_str(), "AB12CD");
        assert!(serde_json::from_str::<RoomCode>("\"A\"").is_err());
    }

    #[test]
    fn test_role_peer() {
        assert_eq!(Role::Initiator.peer(), Role::Responder);
        assert_eq!(Role::Responder.peer(), Role::Initiator);
    }

    #[test]
    fn test_room_status_wire_format() {
        assert_eq!(
            serde_json::to_value(RoomStatus::Disconnected).unwrap(),
            serde_json::json!("disconnected")
        );
        assert_eq!(RoomStatus::Available.as_str(), "available");
    }

    #[test]
    fn test_signal_accepting_states() {
        assert!(ConnectionState::WatchingRoom.accepts_signals());
        assert!(ConnectionState::Negotiating.accepts_signals());
        assert!(ConnectionState::Connected.accepts_signals());
        assert!(!ConnectionState::Reconnecting.accepts_signals());
        assert!(!ConnectionState::Failed.accepts_signals());
        assert!(!ConnectionState::Disconnected.accepts_signals());
        assert!(!ConnectionState::ConnectingToStore.accepts_signals());
    }
}
