//! In-process signaling store.
//!
//! `MemoryStore` holds one shared tree; each endpoint talks to it through its
//! own `MemoryClient`, which carries connection presence, disconnect actions
//! and watch registrations. Dropping a client's connection runs its disconnect
//! actions and withholds watch deliveries until the client reconnects, at which
//! point every watch is resynchronized against the current tree.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use super::{ChildStream, DisconnectAction, SignalingStore, StoreError, ValueStream};

/// Shared in-memory tree.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

#[derive(Debug)]
struct StoreInner {
    tree: Value,
    next_push_id: u64,
    next_client_id: u64,
    clients: HashMap<u64, ClientState>,
    watchers: Vec<Watcher>,
}

#[derive(Debug)]
struct ClientState {
    connected: bool,
    reachable: bool,
    presence: watch::Sender<bool>,
    on_disconnect: Vec<(Vec<String>, DisconnectAction)>,
}

#[derive(Debug)]
struct Watcher {
    client_id: u64,
    path: Vec<String>,
    kind: WatchKind,
}

#[derive(Debug)]
enum WatchKind {
    Value {
        /// `None` until the first delivery.
        last: Option<Option<Value>>,
        tx: mpsc::UnboundedSender<Option<Value>>,
    },
    ChildAdded {
        seen: BTreeSet<String>,
        tx: mpsc::UnboundedSender<(String, Value)>,
    },
}

impl Watcher {
    fn is_closed(&self) -> bool {
        match &self.kind {
            WatchKind::Value { tx, .. } => tx.is_closed(),
            WatchKind::ChildAdded { tx, .. } => tx.is_closed(),
        }
    }

    /// Deliver whatever changed since the last delivery. Returns `false` once
    /// the receiver is gone.
    fn deliver(&mut self, tree: &Value) -> bool {
        let current = get_at(tree, &self.path);
        match &mut self.kind {
            WatchKind::Value { last, tx } => {
                if last.as_ref() != Some(&current) {
                    if tx.send(current.clone()).is_err() {
                        return false;
                    }
                    *last = Some(current);
                }
                true
            }
            WatchKind::ChildAdded { seen, tx } => {
                let children = match current {
                    Some(Value::Object(map)) => map,
                    _ => Map::new(),
                };
                let mut keys: Vec<&String> = children.keys().collect();
                keys.sort();
                for key in keys {
                    if seen.contains(key) {
                        continue;
                    }
                    let Some(value) = children.get(key) else {
                        continue;
                    };
                    if tx.send((key.clone(), value.clone())).is_err() {
                        return false;
                    }
                    seen.insert(key.clone());
                }
                seen.retain(|key| children.contains_key(key));
                true
            }
        }
    }
}

impl StoreInner {
    fn set(&mut self, path: &[String], value: Value) {
        set_at(&mut self.tree, path, value);
    }

    fn notify(&mut self) {
        let StoreInner {
            tree,
            clients,
            watchers,
            ..
        } = self;
        watchers.retain_mut(|watcher| {
            let connected = clients
                .get(&watcher.client_id)
                .is_some_and(|client| client.connected);
            if connected {
                watcher.deliver(tree)
            } else {
                !watcher.is_closed()
            }
        });
    }

    fn client(&mut self, id: u64) -> Option<&mut ClientState> {
        self.clients.get_mut(&id)
    }

    fn connect(&mut self, id: u64) {
        if let Some(client) = self.client(id) {
            client.connected = true;
            client.presence.send_replace(true);
        }
        self.notify();
    }

    fn disconnect(&mut self, id: u64) {
        let actions = match self.client(id) {
            Some(client) if client.connected => {
                client.connected = false;
                client.presence.send_replace(false);
                std::mem::take(&mut client.on_disconnect)
            }
            _ => return,
        };
        for (path, action) in actions {
            let value = match action {
                DisconnectAction::Delete => Value::Null,
                DisconnectAction::Set(value) => value,
            };
            self.set(&path, value);
        }
        self.notify();
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                tree: Value::Object(Map::new()),
                next_push_id: 0,
                next_client_id: 0,
                clients: HashMap::new(),
                watchers: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new connected client.
    #[must_use]
    pub fn client(&self) -> MemoryClient {
        let mut inner = self.lock();
        let id = inner.next_client_id;
        inner.next_client_id += 1;
        let (presence, _) = watch::channel(true);
        inner.clients.insert(
            id,
            ClientState {
                connected: true,
                reachable: true,
                presence,
                on_disconnect: Vec::new(),
            },
        );
        MemoryClient {
            store: self.clone(),
            id,
        }
    }

    /// Read the value at `path` regardless of any client's connectivity.
    #[must_use]
    pub fn snapshot(&self, path: &str) -> Option<Value> {
        get_at(&self.lock().tree, &split_path(path))
    }

    /// Number of live watch registrations across all clients.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.is_closed());
        inner.watchers.len()
    }
}

/// One endpoint's connection to a `MemoryStore`.
#[derive(Debug, Clone)]
pub struct MemoryClient {
    store: MemoryStore,
    id: u64,
}

impl MemoryClient {
    /// The store this client is attached to.
    #[must_use]
    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    /// Whether the client currently holds a connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.store
            .lock()
            .clients
            .get(&self.id)
            .is_some_and(|c| c.connected)
    }

    /// Simulate a transport drop: presence goes false, registered disconnect
    /// actions run and every operation fails until the client reconnects.
    pub fn drop_connection(&self) {
        debug!(target: "roomlink.store.memory", client_id = self.id, "Dropping client connection");
        self.store.lock().disconnect(self.id);
    }

    /// Simulate the transport coming back on its own.
    pub fn restore_connection(&self) {
        debug!(target: "roomlink.store.memory", client_id = self.id, "Restoring client connection");
        let mut inner = self.store.lock();
        if let Some(client) = inner.client(self.id) {
            client.reachable = true;
        }
        inner.connect(self.id);
    }

    /// Control whether `reconnect` can succeed.
    pub fn set_reachable(&self, reachable: bool) {
        if let Some(client) = self.store.lock().client(self.id) {
            client.reachable = reachable;
        }
    }

    fn with_connection<R>(
        &self,
        f: impl FnOnce(&mut StoreInner) -> R,
    ) -> Result<R, StoreError> {
        let mut inner = self.store.lock();
        let connected = inner
            .clients
            .get(&self.id)
            .is_some_and(|c| c.connected);
        if !connected {
            return Err(StoreError::Disconnected);
        }
        Ok(f(&mut inner))
    }
}

#[async_trait]
impl SignalingStore for MemoryClient {
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = split_path(path);
        self.with_connection(|inner| {
            inner.set(&path, value);
            inner.notify();
        })
    }

    async fn update(&self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        let base = split_path(path);
        self.with_connection(|inner| {
            for (key, value) in fields {
                let mut field_path = base.clone();
                field_path.extend(split_path(&key));
                inner.set(&field_path, value);
            }
            inner.notify();
        })
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.write(path, Value::Null).await
    }

    async fn push(&self, path: &str, value: Value) -> Result<String, StoreError> {
        let base = split_path(path);
        self.with_connection(|inner| {
            let key = format!("c{:016}", inner.next_push_id);
            inner.next_push_id += 1;
            let mut child = base.clone();
            child.push(key.clone());
            inner.set(&child, value);
            inner.notify();
            key
        })
    }

    async fn read_once(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = split_path(path);
        self.with_connection(|inner| get_at(&inner.tree, &path))
    }

    async fn watch(&self, path: &str) -> Result<ValueStream, StoreError> {
        let path = split_path(path);
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = self.id;
        self.with_connection(|inner| {
            let mut watcher = Watcher {
                client_id,
                path,
                kind: WatchKind::Value { last: None, tx },
            };
            watcher.deliver(&inner.tree);
            inner.watchers.push(watcher);
        })?;
        Ok(rx)
    }

    async fn watch_child_added(&self, path: &str) -> Result<ChildStream, StoreError> {
        let path = split_path(path);
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = self.id;
        self.with_connection(|inner| {
            let mut watcher = Watcher {
                client_id,
                path,
                kind: WatchKind::ChildAdded {
                    seen: BTreeSet::new(),
                    tx,
                },
            };
            watcher.deliver(&inner.tree);
            inner.watchers.push(watcher);
        })?;
        Ok(rx)
    }

    async fn on_disconnect(
        &self,
        path: &str,
        action: DisconnectAction,
    ) -> Result<(), StoreError> {
        let path = split_path(path);
        let id = self.id;
        self.with_connection(|inner| {
            if let Some(client) = inner.client(id) {
                client.on_disconnect.push((path, action));
            }
        })
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        let path = split_path(path);
        let id = self.id;
        self.with_connection(|inner| {
            if let Some(client) = inner.client(id) {
                client.on_disconnect.retain(|(p, _)| *p != path);
            }
        })
    }

    fn presence(&self) -> watch::Receiver<bool> {
        let inner = self.store.lock();
        match inner.clients.get(&self.id) {
            Some(client) => client.presence.subscribe(),
            None => watch::channel(false).1,
        }
    }

    async fn reconnect(&self) -> Result<(), StoreError> {
        let mut inner = self.store.lock();
        let Some(client) = inner.client(self.id) else {
            return Err(StoreError::Disconnected);
        };
        if client.connected {
            return Ok(());
        }
        if !client.reachable {
            return Err(StoreError::Network("store unreachable".to_string()));
        }
        inner.connect(self.id);
        debug!(target: "roomlink.store.memory", client_id = self.id, "Client reconnected");
        Ok(())
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn get_at(node: &Value, path: &[String]) -> Option<Value> {
    let mut current = node;
    for segment in path {
        current = current.as_object()?.get(segment)?;
    }
    match current {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        other => Some(other.clone()),
    }
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Set `value` at `path` below `node`. `null` (or an empty object) removes the
/// key and prunes parents left empty.
fn set_at(node: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *node = if is_empty_node(&value) {
            Value::Object(Map::new())
        } else {
            value
        };
        return;
    };

    if is_empty_node(&value) {
        let Some(map) = node.as_object_mut() else {
            return;
        };
        if rest.is_empty() {
            map.remove(first);
            return;
        }
        let prune = match map.get_mut(first) {
            Some(child) => {
                set_at(child, rest, Value::Null);
                is_empty_node(child)
            }
            None => false,
        };
        if prune {
            map.remove(first);
        }
        return;
    }

    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Some(map) = node.as_object_mut() {
        if rest.is_empty() {
            map.insert(first.clone(), value);
        } else {
            let child = map
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            set_at(child, rest, value);
        }
    }
}
