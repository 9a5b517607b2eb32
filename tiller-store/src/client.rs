//! # Shared Store Client
//!
//! Bootstraps a session-backed coordination client (ACL composition,
//! digest authentication, blocking connect with timeout) and wraps it in
//! a shared handle that other subsystems use for the life of the
//! process. The handle carries an ordered list of pre-close hooks so the
//! election core can abdicate before the session is torn down, and
//! retry-wraps transient operations with the configured policy.

use bytes::Bytes;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use tiller_core::store::{
    Acl, ChildWatch, CoordinationClient, CreateMode, SessionState,
};
use tiller_core::{Result, RetryPolicy, StoreError};

use crate::config::StoreConfig;

/// Future type returned by pre-close hooks.
pub type HookFuture = Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// A shutdown callback invoked before the underlying client closes.
pub type PreCloseHook = Box<dyn Fn() -> HookFuture + Send + Sync>;

/// Handle for deregistering a previously registered pre-close hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookId(Uuid);

/// Composes the effective default ACL: the caller-provided entries plus
/// the world-readable entry, deduplicated. External tooling can then
/// discover the current leader without credentials.
pub fn effective_acl(base: &[Acl]) -> Vec<Acl> {
    let mut acl: Vec<Acl> = Vec::with_capacity(base.len() + 1);
    for entry in base.iter().chain(std::iter::once(&Acl::world_readable())) {
        if !acl.contains(entry) {
            acl.push(entry.clone());
        }
    }
    acl
}

/// Connects a store client per the bootstrap contract.
///
/// Registers digest authentication when credentials are supplied, starts
/// the client, and blocks until the session is connected or the blocking
/// connect timeout elapses. On timeout, an error the client captured but
/// could not route anywhere is surfaced in preference to a generic
/// timeout. Failures here are fatal to the caller's election attempt; no
/// retry loop wraps this function.
pub async fn connect(
    config: &StoreConfig,
    client: Arc<dyn CoordinationClient>,
) -> Result<SharedStoreClient> {
    config.validate()?;

    let default_acl = effective_acl(&config.base_acl);

    if let Some(credentials) = &config.credentials {
        client
            .add_auth("digest", Bytes::from(credentials.auth_payload()))
            .await?;
    }

    client.start().await?;

    let connected = client
        .await_connected(config.blocking_connect_timeout)
        .await?;
    if !connected {
        if let Some(err) = client.last_unhandled_error() {
            return Err(err);
        }
        return Err(StoreError::ConnectTimeout {
            waited_ms: config.blocking_connect_timeout.as_millis() as u64,
        });
    }

    info!(
        "Will do leader election through {}",
        config.redacted_connect_string()
    );

    Ok(SharedStoreClient {
        inner: client,
        default_acl,
        retry: config.retry.clone(),
        hooks: Mutex::new(Vec::new()),
        closing: AtomicBool::new(false),
    })
}

/// Connected store client shared across scheduler subsystems.
///
/// Subsystems that must act before the session ends register pre-close
/// hooks; [`close`](SharedStoreClient::close) runs them in registration
/// order and only then closes the underlying client. The election core
/// uses this to delete its ephemeral membership node while still
/// connected.
pub struct SharedStoreClient {
    inner: Arc<dyn CoordinationClient>,
    default_acl: Vec<Acl>,
    retry: RetryPolicy,
    hooks: Mutex<Vec<(HookId, PreCloseHook)>>,
    closing: AtomicBool,
}

impl std::fmt::Debug for SharedStoreClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedStoreClient")
            .field("default_acl", &self.default_acl)
            .field("retry", &self.retry)
            .field("closing", &self.closing.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SharedStoreClient {
    /// The effective default ACL, applied to every path this handle
    /// creates. Per-path queries resolve to the same list.
    pub fn default_acl(&self, _path: Option<&str>) -> &[Acl] {
        &self.default_acl
    }

    /// Registers a hook to run before the underlying client closes.
    pub fn register_pre_close(&self, hook: PreCloseHook) -> HookId {
        let id = HookId(Uuid::new_v4());
        self.hooks.lock().push((id, hook));
        debug!("Registered pre-close hook {:?}", id);
        id
    }

    /// Removes a previously registered hook. Once the client has begun
    /// closing this is a no-op: the hook list has already been drained
    /// and the shutdown is in progress.
    pub fn deregister_pre_close(&self, id: HookId) {
        if self.closing.load(Ordering::SeqCst) {
            return;
        }
        self.hooks.lock().retain(|(hook_id, _)| *hook_id != id);
    }

    /// Runs all pre-close hooks in registration order, then closes the
    /// underlying client. Subsequent calls are no-ops.
    pub async fn close(&self) -> Result<()> {
        if self.closing.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let hooks: Vec<(HookId, PreCloseHook)> = self.hooks.lock().drain(..).collect();
        for (id, hook) in hooks {
            debug!("Running pre-close hook {:?}", id);
            hook().await;
        }

        self.inner.close().await
    }

    /// Current state of the underlying session.
    pub fn session_state(&self) -> SessionState {
        self.inner.session_state()
    }

    /// Idempotently creates `path` and missing parents with the
    /// effective default ACL.
    pub async fn ensure_path(&self, path: &str) -> Result<()> {
        self.retry
            .run("ensure_path", || {
                self.inner.ensure_path(path, &self.default_acl)
            })
            .await
    }

    /// Creates a node with the effective default ACL; returns the actual
    /// path including any assigned sequence suffix.
    pub async fn create(&self, path: &str, data: Bytes, mode: CreateMode) -> Result<String> {
        self.retry
            .run("create", || {
                self.inner.create(path, data.clone(), mode, &self.default_acl)
            })
            .await
    }

    /// Deletes a node.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.retry.run("delete", || self.inner.delete(path)).await
    }

    /// Returns whether a node exists.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        self.retry.run("exists", || self.inner.exists(path)).await
    }

    /// Reads a node's payload.
    pub async fn get_data(&self, path: &str) -> Result<Bytes> {
        self.retry
            .run("get_data", || self.inner.get_data(path))
            .await
    }

    /// Reads the names of a node's children.
    pub async fn get_children(&self, path: &str) -> Result<Vec<String>> {
        self.retry
            .run("get_children", || self.inner.get_children(path))
            .await
    }

    /// Reads a node's children and arms a one-shot child watch in a
    /// single operation.
    pub async fn watch_children(&self, path: &str) -> Result<(Vec<String>, ChildWatch)> {
        self.retry
            .run("watch_children", || self.inner.watch_children(path))
            .await
    }
}
