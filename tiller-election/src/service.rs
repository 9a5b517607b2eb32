//! # Election Lifecycle
//!
//! Ties the leadership stream's lifetime to the subscriber's cancel
//! handle and to the shared store client. Start registers a pre-close
//! hook on the client so abdication happens before the session is torn
//! down; cancel closes the latch before completing the stream, so a
//! subsequent session close can assume the membership node is gone.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use tiller_core::CandidateId;
use tiller_store::{HookId, SharedStoreClient};

use crate::errors::{ElectionError, ElectionResult};
use crate::latch::LeaderLatch;
use crate::metrics::RetrievalTimers;
use crate::observer::ElectionLoop;
use crate::stream::{leadership_stream, EventPublisher, LeadershipEvents};

/// Configuration for one election attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Base election path. The latch operates on a sibling subpath so
    /// it can coexist with legacy election records under this parent.
    pub election_path: String,
    /// This process's cluster-unique identifier, conventionally
    /// `host:port`.
    pub candidate_id: CandidateId,
    /// How long the stream may stay silent after start before it fails.
    /// Guards against a store that accepts the TCP connection but never
    /// completes the session handshake.
    pub connection_timeout: Duration,
}

impl ElectionConfig {
    pub fn new(election_path: impl Into<String>, candidate_id: CandidateId) -> Self {
        Self {
            election_path: election_path.into(),
            candidate_id,
            connection_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

struct HandleInner {
    client: Arc<SharedStoreClient>,
    latch: Arc<LeaderLatch>,
    publisher: EventPublisher,
    cancel_tx: watch::Sender<bool>,
    hook_id: Mutex<Option<HookId>>,
    cancelled: AtomicBool,
}

/// Cancel handle for a running election.
///
/// Cancelling abdicates: the latch's membership node is deleted while
/// the session is still live, then the stream completes with its
/// terminal standby event. Cancel is idempotent and never fails; close
/// errors are logged and swallowed.
#[derive(Clone)]
pub struct ElectionHandle {
    inner: Arc<HandleInner>,
}

impl ElectionHandle {
    /// Withdraws from the election and completes the stream. The latch
    /// close finishes before this returns.
    pub async fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("cancelling leader election");

        if let Some(id) = self.inner.hook_id.lock().take() {
            self.inner.client.deregister_pre_close(id);
        }

        let _ = self.inner.cancel_tx.send(true);

        if let Err(err) = self.inner.latch.close().await {
            warn!("ignoring error while closing leader latch during cancel: {}", err);
        }

        self.inner.publisher.complete();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

/// One candidate's participation in the leader election.
pub struct LeaderElection {
    client: Arc<SharedStoreClient>,
    config: ElectionConfig,
    timers: RetrievalTimers,
}

impl LeaderElection {
    pub fn new(
        client: Arc<SharedStoreClient>,
        config: ElectionConfig,
        timers: RetrievalTimers,
    ) -> Self {
        Self {
            client,
            config,
            timers,
        }
    }

    /// Joins the election and returns the leadership event stream with
    /// its cancel handle.
    ///
    /// The pre-close hook is registered before the latch starts, so a
    /// client shutting down mid-start still abdicates first. A latch
    /// start failure fails the stream and is returned.
    pub async fn start(self) -> ElectionResult<(LeadershipEvents, ElectionHandle)> {
        let (publisher, events) = leadership_stream();
        let latch = Arc::new(LeaderLatch::new(
            Arc::clone(&self.client),
            &self.config.election_path,
            self.config.candidate_id.clone(),
            self.timers.clone(),
        ));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let handle = ElectionHandle {
            inner: Arc::new(HandleInner {
                client: Arc::clone(&self.client),
                latch: Arc::clone(&latch),
                publisher: publisher.clone(),
                cancel_tx,
                hook_id: Mutex::new(None),
                cancelled: AtomicBool::new(false),
            }),
        };

        let hook_handle = handle.clone();
        let hook_id = self.client.register_pre_close(Box::new(move || {
            let handle = hook_handle.clone();
            Box::pin(async move { handle.cancel().await })
        }));
        handle.inner.hook_id.lock().replace(hook_id);

        if let Err(err) = latch.start().await {
            publisher.fail(err.clone());
            handle.cancel().await;
            return Err(err);
        }

        let election_loop = ElectionLoop::new(
            Arc::clone(&latch),
            Arc::clone(&self.client),
            publisher.clone(),
            cancel_rx,
        );
        let loop_handle = handle.clone();
        tokio::spawn(async move {
            election_loop.run().await;
            // Stream completion on any exit path releases the latch.
            loop_handle.cancel().await;
        });

        let deadline = self.config.connection_timeout;
        let timeout_publisher = publisher;
        let timeout_handle = handle.clone();
        let mut timeout_cancelled = timeout_handle.inner.cancel_tx.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    if !timeout_publisher.any_emitted() && !timeout_publisher.is_complete() {
                        timeout_publisher.fail(ElectionError::ConnectionTimeout {
                            timeout_ms: deadline.as_millis() as u64,
                        });
                        timeout_handle.cancel().await;
                    }
                }
                _ = timeout_cancelled.changed() => {}
            }
        });

        Ok((events, handle))
    }
}
