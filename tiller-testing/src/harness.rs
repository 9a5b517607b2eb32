//! Shared helpers for driving whole elections against the in-memory
//! store.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use tiller_core::{CandidateId, LeadershipState};
use tiller_election::{
    ElectionConfig, ElectionHandle, LeaderElection, LeadershipEvents, RetrievalTimers,
    LATCH_PATH_SUFFIX,
};
use tiller_store::{connect, SharedStoreClient, StoreConfig};

use crate::store::{InMemoryClient, InMemoryStore};

/// Election path used by every harness-driven candidate.
pub const ELECTION_PATH: &str = "/tiller/election";

/// The sibling subpath the latch actually operates on.
pub fn latch_path() -> String {
    format!("{}{}", ELECTION_PATH, LATCH_PATH_SUFFIX)
}

fn harness_store_config() -> StoreConfig {
    StoreConfig::new("zk1:2181").with_blocking_connect_timeout(Duration::from_millis(500))
}

/// Connects a fresh session against `store`.
pub async fn connected_client(store: &InMemoryStore) -> Arc<SharedStoreClient> {
    connected_client_with(store, |_| {}).await
}

/// Connects a fresh session, applying fault-injection switches to the
/// raw client first.
pub async fn connected_client_with(
    store: &InMemoryStore,
    configure: impl FnOnce(&InMemoryClient),
) -> Arc<SharedStoreClient> {
    let raw = store.client();
    configure(&raw);
    let client = connect(&harness_store_config(), Arc::new(raw))
        .await
        .expect("in-memory connect");
    Arc::new(client)
}

/// Starts a candidate's election with default timers and a generous
/// initial-event deadline.
pub async fn start_candidate(
    client: Arc<SharedStoreClient>,
    id: &str,
) -> (LeadershipEvents, ElectionHandle) {
    let config = ElectionConfig::new(ELECTION_PATH, CandidateId::new(id))
        .with_connection_timeout(Duration::from_secs(5));
    start_candidate_with(client, config, RetrievalTimers::default()).await
}

/// Starts a candidate's election with explicit configuration.
pub async fn start_candidate_with(
    client: Arc<SharedStoreClient>,
    config: ElectionConfig,
    timers: RetrievalTimers,
) -> (LeadershipEvents, ElectionHandle) {
    LeaderElection::new(client, config, timers)
        .start()
        .await
        .expect("election start")
}

/// Waits up to five seconds for the next leadership event.
pub async fn next_event(events: &mut LeadershipEvents) -> LeadershipState {
    timeout(Duration::from_secs(5), events.next())
        .await
        .expect("timed out waiting for a leadership event")
        .expect("stream failed")
        .expect("stream ended")
}

/// Drains the stream to completion, returning everything delivered.
pub async fn drain(events: &mut LeadershipEvents) -> Vec<LeadershipState> {
    let mut delivered = Vec::new();
    loop {
        match timeout(Duration::from_secs(5), events.next())
            .await
            .expect("timed out draining leadership events")
            .expect("stream failed while draining")
        {
            Some(state) => delivered.push(state),
            None => return delivered,
        }
    }
}

/// Polls `condition` until it holds or two seconds elapse.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within two seconds");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
