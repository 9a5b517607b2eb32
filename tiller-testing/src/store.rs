//! In-memory coordination store with session semantics and fault
//! injection.
//!
//! One [`InMemoryStore`] models the cluster-wide store; each candidate
//! gets its own session-backed [`InMemoryClient`]. Ephemeral nodes are
//! tagged with the creating session and vanish when it closes or
//! expires, firing any armed child watches, which is exactly the
//! behavior the election core's watch/poll loop depends on.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::debug;
use uuid::Uuid;

use tiller_core::store::{
    Acl, ChildWatch, CoordinationClient, CoordinationStore, CreateMode, SessionState, WatchEvent,
};
use tiller_core::{Result, StoreError};

#[derive(Clone)]
struct NodeRecord {
    data: Bytes,
    /// Creating session for ephemeral nodes.
    owner: Option<Uuid>,
}

#[derive(Default)]
struct ClusterState {
    nodes: Mutex<BTreeMap<String, NodeRecord>>,
    /// Per-parent sequence counters for ephemeral-sequenced creates.
    counters: Mutex<HashMap<String, u64>>,
    /// Armed one-shot child watches, keyed by watched path.
    watches: Mutex<HashMap<String, Vec<(Uuid, oneshot::Sender<WatchEvent>)>>>,
}

impl ClusterState {
    fn fire_child_watches(&self, path: &str) {
        let armed = self.watches.lock().remove(path);
        if let Some(armed) = armed {
            for (_session, tx) in armed {
                let _ = tx.send(WatchEvent::ChildrenChanged {
                    path: path.to_string(),
                });
            }
        }
    }

    fn child_names(&self, nodes: &BTreeMap<String, NodeRecord>, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        nodes
            .keys()
            .filter(|key| {
                key.starts_with(&prefix) && !key[prefix.len()..].contains('/')
            })
            .map(|key| key[prefix.len()..].to_string())
            .collect()
    }

    fn parent_exists(&self, nodes: &BTreeMap<String, NodeRecord>, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some(("", _)) | None => true,
            Some((parent, _)) => nodes.contains_key(parent),
        }
    }
}

/// The cluster-wide store shared by every test client.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<ClusterState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new latent session against this store.
    pub fn client(&self) -> InMemoryClient {
        let (session_tx, _session_rx) = watch::channel(SessionState::Latent);
        InMemoryClient {
            cluster: Arc::clone(&self.state),
            session_id: Uuid::new_v4(),
            session: session_tx,
            unhandled_error: Mutex::new(None),
            connect_stalled: AtomicBool::new(false),
            watch_missing_path_budget: AtomicUsize::new(0),
        }
    }

    /// Assertion helper: the sorted child names of `path`, empty when
    /// the path does not exist.
    pub fn children(&self, path: &str) -> Vec<String> {
        let nodes = self.state.nodes.lock();
        self.state.child_names(&nodes, path)
    }

    /// Assertion helper: whether a node exists.
    pub fn node_exists(&self, path: &str) -> bool {
        self.state.nodes.lock().contains_key(path)
    }
}

/// One session against an [`InMemoryStore`], with fault-injection
/// switches for exercising the election core's failure paths.
pub struct InMemoryClient {
    cluster: Arc<ClusterState>,
    session_id: Uuid,
    session: watch::Sender<SessionState>,
    unhandled_error: Mutex<Option<StoreError>>,
    connect_stalled: AtomicBool,
    watch_missing_path_budget: AtomicUsize,
}

impl InMemoryClient {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Makes `start` leave the session in CONNECTING forever, so a
    /// blocking connect times out.
    pub fn stall_connect(&self) {
        self.connect_stalled.store(true, Ordering::SeqCst);
    }

    /// Plants an error for `last_unhandled_error` to report.
    pub fn inject_unhandled_error(&self, error: StoreError) {
        self.unhandled_error.lock().replace(error);
    }

    /// Makes the next `count` child-watch reads fail with a missing
    /// path, regardless of whether the path exists.
    pub fn fail_watch_children_with_missing_path(&self, count: usize) {
        self.watch_missing_path_budget.store(count, Ordering::SeqCst);
    }

    /// Expires the session: owned ephemerals are removed, armed watches
    /// of this session error out, and watchers of affected parents fire.
    pub fn expire(&self) {
        let _ = self.session.send(SessionState::Expired);
        self.end_session();
    }

    fn require_connected(&self) -> Result<()> {
        let state = *self.session.borrow();
        if state == SessionState::Connected {
            Ok(())
        } else {
            Err(StoreError::connection(format!(
                "session {} is {}",
                self.session_id, state
            )))
        }
    }

    fn end_session(&self) {
        // Drop this session's armed watches first so they resolve as
        // session loss rather than as ordinary child changes.
        {
            let mut watches = self.cluster.watches.lock();
            for armed in watches.values_mut() {
                armed.retain(|(session, _)| *session != self.session_id);
            }
        }

        let removed_parents: Vec<String> = {
            let mut nodes = self.cluster.nodes.lock();
            let owned: Vec<String> = nodes
                .iter()
                .filter(|(_, record)| record.owner == Some(self.session_id))
                .map(|(path, _)| path.clone())
                .collect();
            let mut parents = Vec::new();
            for path in owned {
                nodes.remove(&path);
                if let Some((parent, _)) = path.rsplit_once('/') {
                    if !parents.contains(&parent.to_string()) {
                        parents.push(parent.to_string());
                    }
                }
            }
            parents
        };

        for parent in removed_parents {
            debug!("session {} released ephemerals under {}", self.session_id, parent);
            self.cluster.fire_child_watches(&parent);
        }
    }
}

#[async_trait]
impl CoordinationStore for InMemoryClient {
    async fn ensure_path(&self, path: &str, _acl: &[Acl]) -> Result<()> {
        self.require_connected()?;

        let mut created_under = Vec::new();
        {
            let mut nodes = self.cluster.nodes.lock();
            let mut current = String::new();
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                current.push('/');
                current.push_str(segment);
                if !nodes.contains_key(&current) {
                    nodes.insert(
                        current.clone(),
                        NodeRecord {
                            data: Bytes::new(),
                            owner: None,
                        },
                    );
                    if let Some((parent, _)) = current.rsplit_once('/') {
                        created_under.push(parent.to_string());
                    }
                }
            }
        }
        for parent in created_under {
            self.cluster.fire_child_watches(&parent);
        }
        Ok(())
    }

    async fn create(
        &self,
        path: &str,
        data: Bytes,
        mode: CreateMode,
        _acl: &[Acl],
    ) -> Result<String> {
        self.require_connected()?;

        let owner = mode.is_ephemeral().then_some(self.session_id);
        let (actual, parent) = {
            let mut nodes = self.cluster.nodes.lock();
            match mode {
                CreateMode::EphemeralSequential => {
                    let parent = path
                        .rsplit_once('/')
                        .map(|(parent, _)| parent.to_string())
                        .unwrap_or_default();
                    if !nodes.contains_key(&parent) {
                        return Err(StoreError::no_node(parent));
                    }
                    let sequence = {
                        let mut counters = self.cluster.counters.lock();
                        let counter = counters.entry(parent.clone()).or_insert(0);
                        let sequence = *counter;
                        *counter += 1;
                        sequence
                    };
                    let actual = format!("{}{:010}", path, sequence);
                    nodes.insert(actual.clone(), NodeRecord { data, owner });
                    (actual, parent)
                }
                CreateMode::Persistent | CreateMode::Ephemeral => {
                    if nodes.contains_key(path) {
                        return Err(StoreError::NodeExists { path: path.into() });
                    }
                    if !self.cluster.parent_exists(&nodes, path) {
                        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
                        return Err(StoreError::no_node(parent));
                    }
                    let parent = path
                        .rsplit_once('/')
                        .map(|(parent, _)| parent.to_string())
                        .unwrap_or_default();
                    nodes.insert(path.to_string(), NodeRecord { data, owner });
                    (path.to_string(), parent)
                }
            }
        };

        self.cluster.fire_child_watches(&parent);
        Ok(actual)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.require_connected()?;

        {
            let mut nodes = self.cluster.nodes.lock();
            if nodes.remove(path).is_none() {
                return Err(StoreError::no_node(path));
            }
        }
        if let Some((parent, _)) = path.rsplit_once('/') {
            self.cluster.fire_child_watches(parent);
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.require_connected()?;
        Ok(self.cluster.nodes.lock().contains_key(path))
    }

    async fn get_data(&self, path: &str) -> Result<Bytes> {
        self.require_connected()?;
        self.cluster
            .nodes
            .lock()
            .get(path)
            .map(|record| record.data.clone())
            .ok_or_else(|| StoreError::no_node(path))
    }

    async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.require_connected()?;
        let nodes = self.cluster.nodes.lock();
        if !nodes.contains_key(path) {
            return Err(StoreError::no_node(path));
        }
        Ok(self.cluster.child_names(&nodes, path))
    }

    async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        self.require_connected()?;

        let budget = &self.watch_missing_path_budget;
        if budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(StoreError::no_node(path));
        }

        let (tx, child_watch) = ChildWatch::pair();
        let children = {
            let nodes = self.cluster.nodes.lock();
            if !nodes.contains_key(path) {
                return Err(StoreError::no_node(path));
            }
            self.cluster.child_names(&nodes, path)
        };
        self.cluster
            .watches
            .lock()
            .entry(path.to_string())
            .or_default()
            .push((self.session_id, tx));
        Ok((children, child_watch))
    }

    async fn add_auth(&self, _scheme: &str, _credentials: Bytes) -> Result<()> {
        if *self.session.borrow() == SessionState::Closed {
            return Err(StoreError::connection("session closed"));
        }
        Ok(())
    }

    fn session_state(&self) -> SessionState {
        *self.session.borrow()
    }
}

#[async_trait]
impl CoordinationClient for InMemoryClient {
    async fn start(&self) -> Result<()> {
        if self.connect_stalled.load(Ordering::SeqCst) {
            let _ = self.session.send(SessionState::Connecting);
        } else {
            let _ = self.session.send(SessionState::Connected);
        }
        Ok(())
    }

    async fn await_connected(&self, timeout: Duration) -> Result<bool> {
        let mut rx = self.session.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if *rx.borrow() == SessionState::Connected {
                return Ok(true);
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(false),
            }
        }
    }

    fn last_unhandled_error(&self) -> Option<StoreError> {
        self.unhandled_error.lock().clone()
    }

    async fn close(&self) -> Result<()> {
        let _ = self.session.send(SessionState::Closed);
        self.end_session();
        Ok(())
    }
}
