//! Store wrapper with failure injection and operation counting.
//!
//! Wraps any `SignalingStore` and fails chosen operation classes with a
//! network error until recovered. Every call is counted by operation name,
//! including the failed ones.
//!
//! # Example
//!
//! ```rust,ignore
//! use roomlink_test_utils::{FaultyStore, StoreOp};
//!
//! let store = Arc::new(FaultyStore::new(memory.client()));
//! store.fail(StoreOp::Write);
//! // ... session writes now fail and it starts reconnecting ...
//! store.recover(StoreOp::Write);
//! assert!(store.count("reconnect") >= 1);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use roomlink::store::{ChildStream, DisconnectAction, SignalingStore, StoreError, ValueStream};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;

/// A class of store operation that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `write`, `update`, `delete`, `push`
    Write,
    /// `read_once`
    Read,
    /// `watch`, `watch_child_added`
    Watch,
    /// `on_disconnect`, `cancel_on_disconnect`
    OnDisconnect,
    /// `reconnect`
    Reconnect,
}

/// Failure-injecting store wrapper.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    failing: Mutex<HashSet<StoreOp>>,
    failing_methods: Mutex<HashSet<&'static str>>,
    counts: Mutex<HashMap<&'static str, usize>>,
}

impl<S: SignalingStore> FaultyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
            failing_methods: Mutex::new(HashSet::new()),
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn fail(&self, op: StoreOp) {
        self.failing.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: StoreOp) {
        self.failing.lock().unwrap().remove(&op);
    }

    /// Fail a single trait method, e.g. `"push"`, leaving the rest of its
    /// class working.
    pub fn fail_method(&self, name: &'static str) {
        self.failing_methods.lock().unwrap().insert(name);
    }

    pub fn recover_method(&self, name: &str) {
        self.failing_methods.lock().unwrap().remove(name);
    }

    pub fn recover_all(&self) {
        self.failing.lock().unwrap().clear();
        self.failing_methods.lock().unwrap().clear();
    }

    /// Calls made to operation `name` (trait method name).
    pub fn count(&self, name: &str) -> usize {
        self.counts.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    /// Calls made across all operations.
    pub fn total(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }

    fn check(&self, op: StoreOp, name: &'static str) -> Result<(), StoreError> {
        *self.counts.lock().unwrap().entry(name).or_insert(0) += 1;
        let injected = self.failing.lock().unwrap().contains(&op)
            || self.failing_methods.lock().unwrap().contains(name);
        if injected {
            debug!(target: "roomlink.test.faulty_store", operation = name, "Injected failure");
            return Err(StoreError::Network(format!("injected {name} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: SignalingStore> SignalingStore for FaultyStore<S> {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check(StoreOp::Write, "write")?;
        self.inner.write(path, value).await
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check(StoreOp::Write, "update")?;
        self.inner.update(path, fields).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.check(StoreOp::Write, "delete")?;
        self.inner.delete(path).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        self.check(StoreOp::Write, "push")?;
        self.inner.push(path, value).await
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check(StoreOp::Read, "read_once")?;
        self.inner.read_once(path).await
    }

    async fn watch(&self, path: &str) -> Result<ValueStream, StoreError> {
        self.check(StoreOp::Watch, "watch")?;
        self.inner.watch(path).await
    }

    async fn watch_child_added(&self, path: &str) -> Result<ChildStream, StoreError> {
        self.check(StoreOp::Watch, "watch_child_added")?;
        self.inner.watch_child_added(path).await
    }

    async fn on_disconnect(
        &self,
        path: &str,
        action: DisconnectAction,
    ) -> Result<(), StoreError> {
        self.check(StoreOp::OnDisconnect, "on_disconnect")?;
        self.inner.on_disconnect(path, action).await
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        self.check(StoreOp::OnDisconnect, "cancel_on_disconnect")?;
        self.inner.cancel_on_disconnect(path).await
    }

    fn presence(&self) -> watch::Receiver<bool> {
        self.inner.presence()
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        self.check(StoreOp::Reconnect, "reconnect")?;
        self.inner.reconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomlink::store::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_passes_through_until_failed() {
        let memory = MemoryStore::new();
        let store = FaultyStore::new(memory.client());

        store.write("rooms/AB12/ping", json!(1)).await.unwrap();
        assert_eq!(memory.snapshot("rooms/AB12/ping"), Some(json!(1)));

        store.fail(StoreOp::Write);
        assert!(matches!(
            store.update("rooms/AB12", Map::new()).await,
            Err(StoreError::Network(_))
        ));
        assert!(store.read_once("rooms/AB12/ping").await.is_ok());

        store.recover(StoreOp::Write);
        assert!(store.delete("rooms/AB12").await.is_ok());
        assert_eq!(store.count("write"), 1);
        assert_eq!(store.count("update"), 1);
        assert_eq!(store.count("delete"), 1);
        assert_eq!(store.count("push"), 0);
    }

    #[tokio::test]
    async fn test_single_method_failure() {
        let memory = MemoryStore::new();
        let store = FaultyStore::new(memory.client());
        store.fail_method("push");

        assert!(store.push("rooms/AB12/candidates", json!(1)).await.is_err());
        assert!(store.update("rooms/AB12", Map::new()).await.is_ok());

        store.recover_all();
        assert!(store.push("rooms/AB12/candidates", json!(1)).await.is_ok());
    }
}
