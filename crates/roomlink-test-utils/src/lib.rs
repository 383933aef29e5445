//! # roomlink Test Utilities
//!
//! Shared test utilities for roomlink signaling sessions.
//!
//! This crate provides mock implementations and fixtures for exercising
//! sessions against an in-process store without real media or network.
//!
//! ## Modules
//!
//! - `mock_engine` - Media engine with a call log and failure injection
//! - `recording_listener` - Listener that records session events
//! - `faulty_store` - Store wrapper with failure injection and op counting
//! - `fixtures` - Test peers, configs and pre-seeded rooms
//! - `eventual` - Polling helper for asynchronous assertions
//!
//! ## Usage
//!
//! ```rust,ignore
//! use roomlink_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let store = MemoryStore::new();
//!     let room = TestRoom::random();
//!
//!     let initiator = TestPeer::spawn(&store, &room, Role::Initiator);
//!     initiator.handle.connect().await.unwrap();
//!
//!     let responder = TestPeer::spawn(&store, &room, Role::Responder);
//!     responder.handle.connect().await.unwrap();
//!
//!     eventually(WaitCategory::Negotiation, || async {
//!         responder.listener.contains(&SessionEvent::ConnectionEstablished)
//!     })
//!     .await
//!     .unwrap();
//! }
//! ```

pub mod eventual;
pub mod faulty_store;
pub mod fixtures;
pub mod mock_engine;
pub mod recording_listener;

pub use eventual::*;
pub use faulty_store::*;
pub use fixtures::*;
pub use mock_engine::*;
pub use recording_listener::*;
