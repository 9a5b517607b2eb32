//! # Watch/Poll Loop
//!
//! Detects every leader change, including transitions among other
//! candidates, by re-arming a one-shot child watch on the election path
//! and re-reading the participant list on every fire.
//!
//! The store's child watch fires at most once, so each iteration arms
//! before it interprets: the combined read-and-arm operation guarantees
//! that a change landing between the read and a separate arm step
//! cannot be missed. All iterations run on one dedicated task, which
//! serializes latch queries, stream offers, and cancellation checks.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

use tiller_core::store::ChildWatch;
use tiller_core::{CandidateId, LeadershipState, Participant, StoreError};
use tiller_store::SharedStoreClient;

use crate::errors::{ElectionError, ElectionResult};
use crate::latch::{LatchState, LeaderLatch};
use crate::stream::EventPublisher;

/// How many times a missing election path is re-read before the stream
/// fails. The latch creates the path asynchronously at startup, so the
/// first reads can race it.
const NODE_MISSING_MAX_ATTEMPTS: usize = 100;

/// Linear backoff step between missing-path reads; attempt `n` waits
/// `n` times this.
const NODE_MISSING_BACKOFF_STEP: Duration = Duration::from_millis(10);

pub(crate) struct ElectionLoop {
    latch: Arc<LeaderLatch>,
    client: Arc<SharedStoreClient>,
    candidate_id: CandidateId,
    publisher: EventPublisher,
    cancelled: watch::Receiver<bool>,
}

impl ElectionLoop {
    pub(crate) fn new(
        latch: Arc<LeaderLatch>,
        client: Arc<SharedStoreClient>,
        publisher: EventPublisher,
        cancelled: watch::Receiver<bool>,
    ) -> Self {
        let candidate_id = latch.candidate_id().clone();
        Self {
            latch,
            client,
            candidate_id,
            publisher,
            cancelled,
        }
    }

    /// Runs until cancelled or the stream fails. In-flight iterations
    /// run to completion; the cancelled flag is consulted before each
    /// new one.
    pub(crate) async fn run(mut self) {
        loop {
            if *self.cancelled.borrow() {
                break;
            }

            let armed = match self.arm_watch().await {
                Ok(Some(watch)) => watch,
                Ok(None) => break,
                Err(err) => {
                    self.publisher.fail(err);
                    break;
                }
            };

            let participants = match self.latch.participants().await {
                Ok(participants) => participants,
                Err(ElectionError::Store(err @ StoreError::NoNode { .. })) => {
                    debug!("election path vanished during read: {}", err);
                    Vec::new()
                }
                Err(ElectionError::Store(err)) if err.is_retryable() => {
                    warn!(
                        "transient error reading election participants, treating as empty: {}",
                        err
                    );
                    Vec::new()
                }
                Err(err) => {
                    self.publisher.fail(err);
                    break;
                }
            };

            if let Err(err) = self.publish_from(participants) {
                self.publisher.fail(err);
                break;
            }

            tokio::select! {
                _ = self.cancelled.changed() => break,
                fired = armed.fired() => match fired {
                    Ok(event) => {
                        debug!("election path changed: {:?}", event);
                    }
                    Err(err) => {
                        self.publisher.fail(err.into());
                        break;
                    }
                },
            }
        }
    }

    /// Arms the one-shot child watch, retrying a missing election path
    /// with linear backoff while the latch start is still in flight.
    async fn arm_watch(&mut self) -> ElectionResult<Option<ChildWatch>> {
        let path = self.latch.latch_path().to_string();
        for attempt in 1..=NODE_MISSING_MAX_ATTEMPTS {
            if *self.cancelled.borrow() {
                return Ok(None);
            }
            match self.client.watch_children(&path).await {
                Ok((_children, watch)) => return Ok(Some(watch)),
                Err(StoreError::NoNode { .. }) if attempt < NODE_MISSING_MAX_ATTEMPTS => {
                    let backoff = NODE_MISSING_BACKOFF_STEP * attempt as u32;
                    debug!(
                        "election path {} not present yet (attempt {}), retrying in {:?}",
                        path, attempt, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(StoreError::NoNode { .. }) => {
                    return Err(ElectionError::ElectionPathMissing {
                        path,
                        attempts: NODE_MISSING_MAX_ATTEMPTS,
                    });
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(ElectionError::internal("missing-path retry loop exited"))
    }

    /// Interprets one participant read and offers the resulting
    /// leadership observation, if any.
    fn publish_from(&self, participants: Vec<Participant>) -> ElectionResult<()> {
        let occurrences = participants
            .iter()
            .filter(|p| p.id == self.candidate_id)
            .count();

        match occurrences {
            // Our membership node is not visible yet; stay silent so
            // restarts observe the same sequence of events.
            0 => debug!("own membership node not visible yet, emitting nothing"),
            1 => {
                let leader = participants.iter().find(|p| p.is_leader);
                let state = match leader {
                    Some(leader)
                        if leader.id == self.candidate_id
                            && self.latch.state() == LatchState::Started =>
                    {
                        LeadershipState::ElectedAsLeader
                    }
                    Some(leader) if leader.id != self.candidate_id => {
                        LeadershipState::Standby(Some(leader.id.clone()))
                    }
                    _ => LeadershipState::Standby(None),
                };
                self.publisher.offer(state);
            }
            count => {
                return Err(ElectionError::DuplicateCandidate {
                    id: self.candidate_id.to_string(),
                    count,
                });
            }
        }
        Ok(())
    }
}
