//! roomlink Signaling Library
//!
//! This library pairs two endpoints for a peer-to-peer media session by
//! rendezvousing through a shared key/value store that neither endpoint dials
//! directly:
//!
//! - Room lifecycle keyed by a short room code (create, join, hang up, expire)
//! - Offer/answer/candidate exchange with strict initiator/responder ordering
//! - Liveness detection from application-level room activity
//! - Bounded exponential-backoff reconnection to the store
//!
//! # Architecture
//!
//! Each session is a single actor that owns all mutable state:
//!
//! ```text
//! SessionHandle (cloneable, caller side)
//! └── SignalingSession actor (one per room membership)
//!     ├── RoomSession       - room record writes and teardown
//!     ├── Negotiator        - offer/answer phase machine + candidate buffer
//!     ├── LivenessMonitor   - staleness detection and probe decisions
//!     └── ReconnectController - attempt counter and backoff deadline
//! ```
//!
//! Store watch callbacks are forwarded into the actor mailbox by per-watch
//! tasks, so state transitions are serialized and negotiation messages are
//! applied in mailbox order.
//!
//! # Modules
//!
//! - [`config`] - Session configuration from environment
//! - [`errors`] - Error types surfaced to callers
//! - [`media`] - Media negotiation engine contract and loopback engine
//! - [`observability`] - Metrics emitted by sessions
//! - [`session`] - Session actor and its components
//! - [`store`] - Signaling store contract and in-process store
//! - [`types`] - Room codes, roles, statuses and connection states

pub mod config;
pub mod errors;
pub mod media;
pub mod observability;
pub mod session;
pub mod store;
pub mod types;

pub use config::Config;
pub use errors::SessionError;
pub use session::{SessionHandle, SignalingSession};
pub use types::{ConnectionState, Role, RoomCode, RoomStatus};
