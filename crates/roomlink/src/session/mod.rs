//! Signaling session.
//!
//! One actor per room membership owns every piece of mutable state:
//!
//! ```text
//! SessionHandle ──mpsc──▶ SignalingSession actor
//!                          ├── RoomSession          (room record writes)
//!                          ├── Negotiator           (offer/answer phases)
//!                          ├── LivenessMonitor      (staleness)
//!                          └── ReconnectController  (backoff deadline)
//!        store watches ──▶ forwarder tasks ──mpsc──▶ (same mailbox)
//! ```
//!
//! # Key Design Decisions
//!
//! - **Single mailbox**: commands and watch deliveries are serialized, so a
//!   remote description is always applied before any candidate queued behind it
//! - **Watch generations**: each (re)registration of the room watches gets a new
//!   generation and `CancellationToken`; deliveries from older generations are dropped
//! - **Deadline, not task**: the backoff deadline is a `select!` branch of the
//!   actor loop, so cancelling a retry is clearing an `Option`
//!
//! # Modules
//!
//! - [`actor`] - `SignalingSession` actor and `SessionHandle`
//! - [`events`] - Listener trait and event values
//! - [`liveness`] - Staleness detection
//! - [`messages`] - Mailbox message types
//! - [`negotiation`] - Offer/answer phase machine
//! - [`reconnect`] - Backoff bookkeeping
//! - [`room`] - Room record and store operations

pub mod actor;
pub mod events;
pub mod liveness;
pub mod messages;
pub mod negotiation;
pub mod reconnect;
pub mod room;

pub use actor::{SessionHandle, SignalingSession};
pub use events::{ChannelListener, NoopListener, SessionEvent, SessionListener};
pub use liveness::{LivenessMonitor, LivenessVerdict};
pub use messages::{Outbound, RoomEvent, SessionStatus};
pub use negotiation::{CandidateOutcome, DescriptionOutcome, NegotiationPhase, Negotiator};
pub use reconnect::{ReconnectController, RetryDecision};
pub use room::{CandidateRecord, DescriptionRecord, RoomRecord, RoomSession};
