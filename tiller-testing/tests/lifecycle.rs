//! Lifecycle and invariant coverage: cancel idempotence, abdication
//! ordering against the shared client, event-stream invariants, and
//! retrieval metrics.

use std::time::Duration;

use tiller_core::LeadershipState;
use tiller_election::{
    ElectionConfig, RetrievalTimers, TimerRegistry, LEGACY_RETRIEVAL_TIMER, RETRIEVAL_TIMER,
};
use tiller_core::CandidateId;
use tiller_testing::harness::{
    connected_client, drain, latch_path, next_event, start_candidate, start_candidate_with,
    ELECTION_PATH,
};
use tiller_testing::InMemoryStore;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

#[tokio::test]
async fn test_cancel_is_idempotent() {
    init_logging();
    let store = InMemoryStore::new();
    let (mut events, handle) = start_candidate(connected_client(&store).await, "a:1").await;

    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    handle.cancel().await;
    handle.cancel().await;
    let other = handle.clone();
    other.cancel().await;

    // Exactly one terminal standby regardless of how often cancel ran.
    let remaining = drain(&mut events).await;
    assert_eq!(remaining, vec![LeadershipState::Standby(None)]);
    assert!(handle.is_cancelled());
    assert!(store.children(&latch_path()).is_empty());
}

#[tokio::test]
async fn test_start_then_cancel_restores_the_child_set() {
    init_logging();
    let store = InMemoryStore::new();
    let client = connected_client(&store).await;

    let before = store.children(&latch_path());
    let (mut events, handle) = start_candidate(client, "a:1").await;
    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    handle.cancel().await;
    assert_eq!(store.children(&latch_path()), before);
}

#[tokio::test]
async fn test_client_close_abdicates_through_the_pre_close_hook() {
    init_logging();
    let store = InMemoryStore::new();
    let client = connected_client(&store).await;

    let (mut events, _handle) = start_candidate(client.clone(), "a:1").await;
    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    // Closing the shared client must cancel the election first: the
    // stream completes normally, which only the abdication path does.
    client.close().await.unwrap();

    let remaining = drain(&mut events).await;
    assert_eq!(remaining, vec![LeadershipState::Standby(None)]);
    assert!(store.children(&latch_path()).is_empty());
}

#[tokio::test]
async fn test_no_consecutive_equal_events_across_a_failover() {
    init_logging();
    let store = InMemoryStore::new();

    let (mut events_a, handle_a) =
        start_candidate(connected_client(&store).await, "a:1").await;
    assert_eq!(next_event(&mut events_a).await, LeadershipState::ElectedAsLeader);

    let (mut events_b, handle_b) =
        start_candidate(connected_client(&store).await, "b:2").await;

    let mut observed_b = vec![next_event(&mut events_b).await];
    handle_a.cancel().await;
    observed_b.push(next_event(&mut events_b).await);
    handle_b.cancel().await;
    observed_b.extend(drain(&mut events_b).await);

    assert_eq!(
        observed_b,
        vec![
            LeadershipState::Standby(Some(CandidateId::new("a:1"))),
            LeadershipState::ElectedAsLeader,
            LeadershipState::Standby(None),
        ]
    );
    for pair in observed_b.windows(2) {
        assert_ne!(pair[0], pair[1], "stream delivered equal events back to back");
    }
}

#[tokio::test]
async fn test_subscriber_cancel_handle_triggers_abdication() {
    init_logging();
    let store = InMemoryStore::new();
    let (mut events, handle) = start_candidate(connected_client(&store).await, "a:1").await;

    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);

    // The subscriber side holds a clone of the handle; cancelling it is
    // the same abdication path.
    let subscriber_handle = handle.clone();
    let canceller = tokio::spawn(async move { subscriber_handle.cancel().await });

    let remaining = drain(&mut events).await;
    assert_eq!(remaining, vec![LeadershipState::Standby(None)]);
    canceller.await.unwrap();
    assert!(store.children(&latch_path()).is_empty());
}

#[tokio::test]
async fn test_retrieval_timers_record_every_participant_read() {
    init_logging();
    let store = InMemoryStore::new();
    let registry = TimerRegistry::new();
    let timers = RetrievalTimers::new(registry.clone());

    let config = ElectionConfig::new(ELECTION_PATH, CandidateId::new("a:1"))
        .with_connection_timeout(Duration::from_secs(5));
    let (mut events, handle) =
        start_candidate_with(connected_client(&store).await, config, timers).await;

    assert_eq!(next_event(&mut events).await, LeadershipState::ElectedAsLeader);
    handle.cancel().await;

    for name in [LEGACY_RETRIEVAL_TIMER, RETRIEVAL_TIMER] {
        let stats = registry
            .snapshot(name)
            .unwrap_or_else(|| panic!("timer {} never recorded", name));
        assert!(stats.count >= 1);
    }
    let legacy = registry.snapshot(LEGACY_RETRIEVAL_TIMER).unwrap();
    let current = registry.snapshot(RETRIEVAL_TIMER).unwrap();
    assert_eq!(legacy.count, current.count);
}
