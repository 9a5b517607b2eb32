//! End-to-end election scenarios against the in-memory store: solo
//! leadership, failover, transitions among other candidates, startup
//! races, duplicate identities, and connect failures.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tiller_core::store::{CoordinationClient, CoordinationStore, CreateMode};
use tiller_core::{CandidateId, LeadershipState, StoreError};
use tiller_election::{ElectionConfig, ElectionError, RetrievalTimers};
use tiller_testing::harness::{
    connected_client, connected_client_with, latch_path, next_event, start_candidate,
    start_candidate_with, wait_until, ELECTION_PATH,
};
use tiller_testing::InMemoryStore;
use tiller_store::{connect, StoreConfig};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn standby(id: &str) -> LeadershipState {
    LeadershipState::Standby(Some(CandidateId::new(id)))
}

#[tokio::test]
async fn test_solo_candidate_wins_and_abdicates() {
    init_logging();
    let store = InMemoryStore::new();
    let client = connected_client(&store).await;

    let (mut events, handle) = start_candidate(client, "a:1").await;
    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    handle.cancel().await;
    assert_eq!(events.next().await.unwrap(), Some(LeadershipState::Standby(None)));
    assert_eq!(events.next().await.unwrap(), None);

    // Abdication removed the membership node.
    assert!(store.children(&latch_path()).is_empty());
}

#[tokio::test]
async fn test_two_candidate_failover() {
    init_logging();
    let store = InMemoryStore::new();

    let (mut events_a, handle_a) =
        start_candidate(connected_client(&store).await, "a:1").await;
    assert_eq!(next_event(&mut events_a).await, LeadershipState::ElectedAsLeader);

    let (mut events_b, handle_b) =
        start_candidate(connected_client(&store).await, "b:2").await;
    assert_eq!(next_event(&mut events_b).await, standby("a:1"));

    handle_a.cancel().await;
    assert_eq!(events_a.next().await.unwrap(), Some(LeadershipState::Standby(None)));
    assert_eq!(events_a.next().await.unwrap(), None);

    // The survivor takes over once the old leader's node vanishes.
    assert_eq!(next_event(&mut events_b).await, LeadershipState::ElectedAsLeader);

    handle_b.cancel().await;
    assert_eq!(events_b.next().await.unwrap(), Some(LeadershipState::Standby(None)));
    assert_eq!(events_b.next().await.unwrap(), None);
}

#[tokio::test]
async fn test_observer_sees_leader_transitions_among_others() {
    init_logging();
    let store = InMemoryStore::new();

    // Join order fixes the sequence order: b leads, then c, then a.
    let (mut events_b, handle_b) =
        start_candidate(connected_client(&store).await, "b:2").await;
    assert_eq!(next_event(&mut events_b).await, LeadershipState::ElectedAsLeader);

    let (mut events_c, _handle_c) =
        start_candidate(connected_client(&store).await, "c:3").await;
    assert_eq!(next_event(&mut events_c).await, standby("b:2"));

    let (mut events_a, _handle_a) =
        start_candidate(connected_client(&store).await, "a:1").await;
    assert_eq!(next_event(&mut events_a).await, standby("b:2"));

    // The observer is not involved in the handover, yet must see it.
    handle_b.cancel().await;
    assert_eq!(next_event(&mut events_a).await, standby("c:3"));
    assert_eq!(next_event(&mut events_c).await, LeadershipState::ElectedAsLeader);
}

#[tokio::test]
async fn test_startup_race_retries_with_linear_backoff() {
    init_logging();
    let store = InMemoryStore::new();
    let client =
        connected_client_with(&store, |raw| raw.fail_watch_children_with_missing_path(5)).await;

    let started = Instant::now();
    let (mut events, handle) = start_candidate(client, "a:1").await;
    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    // Five missing-path reads back off 10+20+30+40+50 ms before the
    // sixth succeeds.
    assert!(started.elapsed() >= Duration::from_millis(150));
    handle.cancel().await;
}

#[tokio::test]
async fn test_duplicate_identity_fails_the_stream_and_releases_the_latch() {
    init_logging();
    let store = InMemoryStore::new();

    // An impostor already owns a membership node with our id.
    let impostor = store.client();
    impostor.start().await.unwrap();
    assert!(impostor.await_connected(Duration::from_millis(100)).await.unwrap());
    impostor.ensure_path(&latch_path(), &[]).await.unwrap();
    let impostor_node = impostor
        .create(
            &format!("{}/a:1-", latch_path()),
            bytes::Bytes::from("a:1"),
            CreateMode::EphemeralSequential,
            &[],
        )
        .await
        .unwrap();

    let (mut events, handle) = start_candidate(connected_client(&store).await, "a:1").await;

    let err = loop {
        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("timed out waiting for the stream to fail");
        match next {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stream completed instead of failing"),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, ElectionError::DuplicateCandidate { count: 2, .. }));

    // Our own node is deleted on the way out; the impostor's remains.
    wait_until(|| store.children(&latch_path()).len() == 1).await;
    assert!(store.node_exists(&impostor_node));
    assert!(handle.is_cancelled());
}

#[tokio::test]
async fn test_connect_timeout_when_handshake_never_completes() {
    init_logging();
    let store = InMemoryStore::new();

    let raw = store.client();
    raw.stall_connect();
    let config = StoreConfig::new("zk1:2181")
        .with_blocking_connect_timeout(Duration::from_millis(100));

    let started = Instant::now();
    let err = connect(&config, Arc::new(raw)).await.unwrap_err();
    assert!(matches!(err, StoreError::ConnectTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_connect_surfaces_captured_unhandled_error() {
    init_logging();
    let store = InMemoryStore::new();

    let raw = store.client();
    raw.stall_connect();
    raw.inject_unhandled_error(StoreError::Auth {
        message: "digest rejected".into(),
    });
    let config = StoreConfig::new("zk1:2181")
        .with_blocking_connect_timeout(Duration::from_millis(100));

    let err = connect(&config, Arc::new(raw)).await.unwrap_err();
    assert!(matches!(err, StoreError::Auth { .. }));
}

#[tokio::test]
async fn test_silent_stream_fails_after_initial_deadline() {
    init_logging();
    let store = InMemoryStore::new();

    // The election path never becomes readable inside the deadline.
    let client =
        connected_client_with(&store, |raw| raw.fail_watch_children_with_missing_path(1000))
            .await;
    let config = ElectionConfig::new(ELECTION_PATH, CandidateId::new("a:1"))
        .with_connection_timeout(Duration::from_millis(50));

    let (mut events, handle) =
        start_candidate_with(client, config, RetrievalTimers::default()).await;

    let err = loop {
        let next = tokio::time::timeout(Duration::from_secs(5), events.next())
            .await
            .expect("timed out waiting for the stream to fail");
        match next {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stream completed instead of failing"),
            Err(err) => break err,
        }
    };
    assert!(matches!(err, ElectionError::ConnectionTimeout { .. }));
    wait_until(|| handle.is_cancelled()).await;
}
