//! Session error types.
//!
//! Join rejections (`RoomNotFound`, `RoomUnavailable`) are reported distinctly
//! from transient store failures so callers can prompt for a different code
//! instead of waiting. Internal details stay in logs; `client_message` is safe
//! to show to end users.

use thiserror::Error;

use crate::media::MediaError;
use crate::store::StoreError;

/// roomlink session error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// Room code is not 4-12 alphanumeric characters.
    #[error("Invalid room code: {0:?}")]
    InvalidRoomCode(String),

    /// No room exists under this code.
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room exists but cannot be joined or created.
    #[error("Room {room_id} unavailable (status: {status})")]
    RoomUnavailable { room_id: String, status: String },

    /// Store read/write failed.
    #[error("Signaling failure: {0}")]
    SignalingFailure(String),

    /// Malformed or rejected session description.
    #[error("Negotiation failure: {0}")]
    NegotiationFailure(String),

    /// Reconnection budget exhausted. Terminal.
    #[error("Reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// The session actor has stopped.
    #[error("Session closed")]
    SessionClosed,

    /// Internal error (channel failures and similar).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Whether the caller may retry the same operation later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SessionError::SignalingFailure(_))
    }

    /// Whether a join was rejected because of the code itself.
    #[must_use]
    pub fn is_join_rejection(&self) -> bool {
        matches!(
            self,
            SessionError::RoomNotFound(_) | SessionError::RoomUnavailable { .. }
        )
    }

    /// Returns a caller-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            SessionError::InvalidRoomCode(_) => {
                "Room codes are 4-12 letters or digits".to_string()
            }
            SessionError::RoomNotFound(_) => {
                "Room code does not exist, please check it".to_string()
            }
            SessionError::RoomUnavailable { .. } => {
                "Room is not available or has been disconnected".to_string()
            }
            SessionError::SignalingFailure(_) => {
                "Cannot reach the signaling server, please try again".to_string()
            }
            SessionError::NegotiationFailure(_) => {
                "Could not negotiate the media session".to_string()
            }
            SessionError::ReconnectExhausted { .. } => {
                "Connection lost and could not be restored".to_string()
            }
            SessionError::SessionClosed | SessionError::Internal(_) => {
                "An internal error occurred".to_string()
            }
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::SignalingFailure(err.to_string())
    }
}

impl From<MediaError> for SessionError {
    fn from(err: MediaError) -> Self {
        SessionError::NegotiationFailure(err.to_string())
    }
}
