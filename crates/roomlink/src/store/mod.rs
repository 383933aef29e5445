//! Signaling store contract.
//!
//! The store is a remote, shared, eventually-synchronized key/value tree.
//! Paths are `/`-separated (`rooms/AB12CD/offer`). Writing `null` removes a
//! key, and empty parents disappear with their last child.
//!
//! Watches are delivered over unbounded channels. A watch stays registered
//! until its receiver is dropped.

pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

pub use memory::{MemoryClient, MemoryStore};

/// Store operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The client has no live connection to the store.
    #[error("store connection lost")]
    Disconnected,

    /// The store rejected the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),
}

/// Action the store performs on the client's behalf once it notices the
/// client is gone.
#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectAction {
    /// Remove the path.
    Delete,
    /// Overwrite the path with a value.
    Set(Value),
}

/// Stream of values at a watched path: the current value first, then every
/// change of the path or a descendant. `None` means the path is absent.
pub type ValueStream = mpsc::UnboundedReceiver<Option<Value>>;

/// Stream of `(key, value)` children added under a watched path. Existing
/// children are delivered first, in key order.
pub type ChildStream = mpsc::UnboundedReceiver<(String, Value)>;

/// Client view of the shared signaling store.
#[async_trait]
pub trait SignalingStore: Send + Sync + 'static {
    /// Overwrite the value at `path`.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Set several children of `path` in one operation.
    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError>;

    /// Remove `path` and everything below it.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;

    /// Append `value` under `path` with a fresh key. Keys sort in insertion order.
    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError>;

    /// Read the value at `path` once.
    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError>;

    /// Watch the value at `path`.
    async fn watch(&self, path: &str) -> Result<ValueStream, StoreError>;

    /// Watch children added under `path`.
    async fn watch_child_added(&self, path: &str) -> Result<ChildStream, StoreError>;

    /// Register an action to run when this client disconnects.
    async fn on_disconnect(&self, path: &str, action: DisconnectAction)
        -> Result<(), StoreError>;

    /// Drop every disconnect action registered for `path`.
    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError>;

    /// Connection presence as seen by this client.
    fn presence(&self) -> watch::Receiver<bool>;

    /// Re-open the connection to the store.
    async fn reconnect(&self) -> Result<(), StoreError>;
}

/// Join path segments with `/`, skipping empty segments.
#[must_use]
pub fn join_path(segments: &[&str]) -> String {
    segments
        .iter()
        .flat_map(|s| s.split('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path(&["rooms", "AB12", "offer"]), "rooms/AB12/offer");
        assert_eq!(join_path(&["/rooms/", "AB12"]), "rooms/AB12");
        assert_eq!(join_path(&["a/b", "", "c"]), "a/b/c");
    }
}
