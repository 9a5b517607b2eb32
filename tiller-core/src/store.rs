//! # Coordination-Store Contract
//!
//! Trait seam over a ZooKeeper-style hierarchical store: ephemeral and
//! ephemeral-sequenced nodes, one-shot child watches, session-based
//! liveness, digest authentication, and per-path ACLs. The election core
//! is written entirely against this contract; implementing the store
//! itself is out of scope.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::error::{Result, StoreError};

/// Node creation modes supported by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateMode {
    /// Node survives the creating session.
    Persistent,
    /// Node is removed when the creating session ends.
    Ephemeral,
    /// Ephemeral node whose name gains a monotonically increasing,
    /// zero-padded sequence suffix assigned by the store.
    EphemeralSequential,
}

impl CreateMode {
    /// Returns true when nodes created in this mode are tied to the
    /// creating session's lifetime.
    pub fn is_ephemeral(&self) -> bool {
        matches!(self, Self::Ephemeral | Self::EphemeralSequential)
    }
}

/// Permission bits attached to an [`Acl`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Perms(pub u32);

impl Perms {
    pub const READ: Perms = Perms(1 << 0);
    pub const WRITE: Perms = Perms(1 << 1);
    pub const CREATE: Perms = Perms(1 << 2);
    pub const DELETE: Perms = Perms(1 << 3);
    pub const ADMIN: Perms = Perms(1 << 4);
    pub const ALL: Perms = Perms(0b11111);

    /// Returns true when every bit in `other` is present in `self`.
    pub fn contains(&self, other: Perms) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A single access-control entry: a scheme, an identity within that
/// scheme, and the permissions granted to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    pub scheme: String,
    pub id: String,
    pub perms: Perms,
}

impl Acl {
    pub fn new(scheme: impl Into<String>, id: impl Into<String>, perms: Perms) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
            perms,
        }
    }

    /// The anonymous world-readable entry. Election paths always carry
    /// this so external tooling can discover the current leader without
    /// credentials.
    pub fn world_readable() -> Self {
        Self::new("world", "anyone", Perms::READ)
    }

    /// Full access for sessions authenticated under the digest scheme.
    pub fn creator_all() -> Self {
        Self::new("auth", "", Perms::ALL)
    }
}

/// Lifecycle of a store session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Client built but not started.
    Latent,
    /// Client started, handshake not yet complete.
    Connecting,
    /// Session established.
    Connected,
    /// Session expired server-side; ephemerals are gone.
    Expired,
    /// Client closed.
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Latent => write!(f, "LATENT"),
            SessionState::Connecting => write!(f, "CONNECTING"),
            SessionState::Connected => write!(f, "CONNECTED"),
            SessionState::Expired => write!(f, "EXPIRED"),
            SessionState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Event delivered when a one-shot child watch fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// The children of the watched path changed.
    ChildrenChanged { path: String },
}

/// One-shot notification that the children of a watched path changed.
///
/// The watch fires at most once and must be re-armed by issuing another
/// [`CoordinationStore::watch_children`] call. Consuming the watch with
/// [`fired`](ChildWatch::fired) suspends until the event arrives; if the
/// owning session dies first the wait resolves to a session error.
#[derive(Debug)]
pub struct ChildWatch {
    rx: oneshot::Receiver<WatchEvent>,
}

impl ChildWatch {
    /// Creates a connected trigger/watch pair. Store implementations
    /// keep the sender and hand the watch to the caller.
    pub fn pair() -> (oneshot::Sender<WatchEvent>, ChildWatch) {
        let (tx, rx) = oneshot::channel();
        (tx, ChildWatch { rx })
    }

    /// Waits for the watch to fire.
    pub async fn fired(self) -> Result<WatchEvent> {
        self.rx.await.map_err(|_| {
            StoreError::session_expired("session ended before the child watch fired")
        })
    }
}

/// Hierarchical store operations the election core depends on.
///
/// All operations are session-scoped: ephemeral nodes created through a
/// client vanish when that client's session ends.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Idempotently creates `path` and any missing parents as persistent
    /// nodes.
    async fn ensure_path(&self, path: &str, acl: &[Acl]) -> Result<()>;

    /// Creates a node and returns the actual path, which for
    /// [`CreateMode::EphemeralSequential`] includes the assigned
    /// sequence suffix.
    async fn create(&self, path: &str, data: Bytes, mode: CreateMode, acl: &[Acl])
        -> Result<String>;

    /// Deletes a node. Fails with [`StoreError::NoNode`] if absent.
    async fn delete(&self, path: &str) -> Result<()>;

    /// Returns whether a node exists.
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Reads a node's payload.
    async fn get_data(&self, path: &str) -> Result<Bytes>;

    /// Reads the names of a node's children, sorted lexicographically.
    async fn get_children(&self, path: &str) -> Result<Vec<String>>;

    /// Reads a node's children and arms a one-shot child watch in a
    /// single operation, so no change between the read and the arming
    /// can be missed.
    async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)>;

    /// Registers authentication material for this session.
    async fn add_auth(&self, scheme: &str, credentials: Bytes) -> Result<()>;

    /// Current session state.
    fn session_state(&self) -> SessionState;
}

/// A startable store client, as produced by a client bootstrap.
///
/// Extends [`CoordinationStore`] with the lifecycle operations the
/// connect sequence needs: start, a bounded wait for the connected
/// state, inspection of errors the client could not route anywhere, and
/// close.
#[async_trait]
pub trait CoordinationClient: CoordinationStore {
    /// Starts the client's connection machinery.
    async fn start(&self) -> Result<()>;

    /// Waits up to `timeout` for the session to reach
    /// [`SessionState::Connected`]. Returns whether it did.
    async fn await_connected(&self, timeout: Duration) -> Result<bool>;

    /// Returns the most recent error the client had no handler for, if
    /// any. Consulted when a blocking connect times out, so the real
    /// cause is surfaced instead of a generic timeout.
    fn last_unhandled_error(&self) -> Option<StoreError>;

    /// Closes the client and ends the session.
    async fn close(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perms_contains() {
        assert!(Perms::ALL.contains(Perms::READ));
        assert!(Perms::ALL.contains(Perms::DELETE));
        assert!(!Perms::READ.contains(Perms::WRITE));
    }

    #[test]
    fn test_world_readable_acl() {
        let acl = Acl::world_readable();
        assert_eq!(acl.scheme, "world");
        assert_eq!(acl.id, "anyone");
        assert!(acl.perms.contains(Perms::READ));
        assert!(!acl.perms.contains(Perms::WRITE));
    }

    #[test]
    fn test_create_mode_ephemerality() {
        assert!(!CreateMode::Persistent.is_ephemeral());
        assert!(CreateMode::Ephemeral.is_ephemeral());
        assert!(CreateMode::EphemeralSequential.is_ephemeral());
    }

    #[tokio::test]
    async fn test_child_watch_fires_once() {
        let (tx, watch) = ChildWatch::pair();
        tx.send(WatchEvent::ChildrenChanged {
            path: "/election".into(),
        })
        .unwrap();

        let event = watch.fired().await.unwrap();
        assert_eq!(
            event,
            WatchEvent::ChildrenChanged {
                path: "/election".into()
            }
        );
    }

    #[tokio::test]
    async fn test_child_watch_reports_session_loss() {
        let (tx, watch) = ChildWatch::pair();
        drop(tx);

        let err = watch.fired().await.unwrap_err();
        assert!(matches!(err, StoreError::SessionExpired { .. }));
    }
}
