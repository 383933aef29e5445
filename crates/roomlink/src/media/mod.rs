//! Media negotiation engine contract.
//!
//! The engine owns capture, encoding and the peer connection itself. Sessions
//! only drive it through offer/answer creation, description application and
//! candidate exchange.

pub mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use loopback::LoopbackEngine;

/// Session description kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// An offer or answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A connectivity candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub sdp_mid: String,
    pub sdp_mline_index: u32,
    pub candidate: String,
}

/// Media engine error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    /// The description could not be parsed or was rejected.
    #[error("invalid session description: {0}")]
    InvalidDescription(String),

    /// The candidate could not be applied.
    #[error("invalid candidate: {0}")]
    InvalidCandidate(String),

    /// The engine is not in a state that allows the call.
    #[error("invalid engine state: {0}")]
    InvalidState(String),

    /// The engine has been shut down.
    #[error("engine closed")]
    Closed,
}

/// Media negotiation engine driven by a session.
#[async_trait]
pub trait MediaEngine: Send + Sync + 'static {
    /// Create a local offer.
    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;

    /// Create a local answer to the applied remote offer.
    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;

    /// Apply a locally created description.
    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), MediaError>;

    /// Apply the peer's description.
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError>;

    /// Apply one of the peer's candidates.
    async fn add_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError>;

    /// Locally gathered candidates to relay to the peer. Returns `None` when
    /// the engine does not gather candidates or the stream was already taken.
    fn take_candidate_events(&self) -> Option<mpsc::UnboundedReceiver<IceCandidate>> {
        None
    }
}
