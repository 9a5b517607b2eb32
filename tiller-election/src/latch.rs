//! # Leader Latch
//!
//! Owns this candidate's ephemeral-sequenced membership node under the
//! election path. The member with the lowest sequence is the leader;
//! sequenced ephemerals avoid the herd effect on failover and give a
//! deterministic order that admits enumerating standbys, not just the
//! leader.

use bytes::Bytes;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use tiller_core::store::CreateMode;
use tiller_core::{CandidateId, Participant, StoreError};
use tiller_store::SharedStoreClient;

use crate::errors::{ElectionError, ElectionResult};
use crate::metrics::RetrievalTimers;

/// Suffix appended to the configured election path. The latch operates
/// on this sibling subpath so legacy election records under the same
/// parent are left untouched.
pub const LATCH_PATH_SUFFIX: &str = "-curator";

/// Lifecycle of a leader latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    /// Built but not started; no membership node exists.
    Latent,
    /// Membership node created; participating in the election.
    Started,
    /// Membership node deleted; out of the election.
    Closed,
}

impl fmt::Display for LatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatchState::Latent => write!(f, "LATENT"),
            LatchState::Started => write!(f, "STARTED"),
            LatchState::Closed => write!(f, "CLOSED"),
        }
    }
}

/// This candidate's handle on the election path.
pub struct LeaderLatch {
    client: Arc<SharedStoreClient>,
    latch_path: String,
    candidate_id: CandidateId,
    timers: RetrievalTimers,
    state: Mutex<LatchState>,
    member_path: Mutex<Option<String>>,
}

impl LeaderLatch {
    /// Builds a latent latch for `candidate_id` under
    /// `election_path + "-curator"`.
    pub fn new(
        client: Arc<SharedStoreClient>,
        election_path: &str,
        candidate_id: CandidateId,
        timers: RetrievalTimers,
    ) -> Self {
        let latch_path = format!("{}{}", election_path.trim_end_matches('/'), LATCH_PATH_SUFFIX);
        Self {
            client,
            latch_path,
            candidate_id,
            timers,
            state: Mutex::new(LatchState::Latent),
            member_path: Mutex::new(None),
        }
    }

    /// The path the latch creates membership nodes under.
    pub fn latch_path(&self) -> &str {
        &self.latch_path
    }

    pub fn candidate_id(&self) -> &CandidateId {
        &self.candidate_id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LatchState {
        *self.state.lock()
    }

    /// The actual path of this candidate's membership node, once
    /// created.
    pub fn member_path(&self) -> Option<String> {
        self.member_path.lock().clone()
    }

    /// Joins the election: idempotently creates the latch path, then
    /// creates this candidate's ephemeral-sequenced membership node.
    pub async fn start(&self) -> ElectionResult<()> {
        {
            let state = self.state.lock();
            if *state != LatchState::Latent {
                return Err(ElectionError::InvalidLatchState {
                    state: state.to_string(),
                    expected: LatchState::Latent.to_string(),
                });
            }
        }

        info!(
            "starting leader latch for {} under {}",
            self.candidate_id, self.latch_path
        );

        self.client.ensure_path(&self.latch_path).await?;

        let member_prefix = format!("{}/{}-", self.latch_path, self.candidate_id);
        let created = self
            .client
            .create(
                &member_prefix,
                Bytes::from(self.candidate_id.to_string()),
                CreateMode::EphemeralSequential,
            )
            .await?;
        debug!("created membership node {}", created);

        *self.member_path.lock() = Some(created);
        *self.state.lock() = LatchState::Started;
        Ok(())
    }

    /// Leaves the election: deletes this candidate's membership node.
    ///
    /// Safe to call after the store session is gone; a missing node is
    /// not an error. Closing twice is a no-op.
    pub async fn close(&self) -> ElectionResult<()> {
        {
            let mut state = self.state.lock();
            if *state == LatchState::Closed {
                return Ok(());
            }
            *state = LatchState::Closed;
        }

        info!("Closing leader latch");
        let member = self.member_path.lock().take();
        if let Some(path) = member {
            match self.client.delete(&path).await {
                Ok(()) => {}
                Err(StoreError::NoNode { .. }) => {
                    debug!("membership node {} already gone", path);
                }
                Err(err) => return Err(err.into()),
            }
        }
        info!("Leader latch closed");
        Ok(())
    }

    /// Reads the current participants, ordered by sequence with the
    /// first flagged as leader. The read is recorded by both retrieval
    /// timers.
    pub async fn participants(&self) -> ElectionResult<Vec<Participant>> {
        let children = self
            .timers
            .time(self.client.get_children(&self.latch_path))
            .await?;
        Ok(participants_from(children))
    }

    /// Whether this candidate currently holds the lowest sequence. Only
    /// a STARTED latch can hold leadership.
    pub async fn has_leadership(&self) -> ElectionResult<bool> {
        if self.state() != LatchState::Started {
            return Ok(false);
        }
        let participants = self.participants().await?;
        Ok(participants
            .first()
            .map_or(false, |p| p.is_leader && p.id == self.candidate_id))
    }
}

/// Derives the ordered participant view from raw member node names.
/// Names that do not follow the `<candidate-id>-<sequence>` shape are
/// skipped.
pub(crate) fn participants_from(children: Vec<String>) -> Vec<Participant> {
    let mut members: Vec<(CandidateId, u64)> = children
        .iter()
        .filter_map(|name| {
            let parsed = parse_member(name);
            if parsed.is_none() {
                debug!("ignoring unrecognized election path child {}", name);
            }
            parsed
        })
        .collect();
    members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

    members
        .into_iter()
        .enumerate()
        .map(|(index, (id, _seq))| Participant {
            id,
            is_leader: index == 0,
        })
        .collect()
}

fn parse_member(name: &str) -> Option<(CandidateId, u64)> {
    let (id, sequence) = name.rsplit_once('-')?;
    if id.is_empty() {
        return None;
    }
    let sequence: u64 = sequence.parse().ok()?;
    Some((CandidateId::new(id), sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_member_handles_dashed_ids() {
        let (id, seq) = parse_member("web-7.example.com:8083-0000000042").unwrap();
        assert_eq!(id.as_str(), "web-7.example.com:8083");
        assert_eq!(seq, 42);

        assert!(parse_member("no-sequence-here-x").is_none());
        assert!(parse_member("-0000000001").is_none());
        assert!(parse_member("plain").is_none());
    }

    #[test]
    fn test_participants_ordered_by_sequence_with_single_leader() {
        let participants = participants_from(vec![
            "b:2-0000000007".to_string(),
            "a:1-0000000003".to_string(),
            "c:3-0000000011".to_string(),
            "garbage".to_string(),
        ]);

        assert_eq!(participants.len(), 3);
        assert_eq!(participants[0].id.as_str(), "a:1");
        assert!(participants[0].is_leader);
        assert_eq!(participants[1].id.as_str(), "b:2");
        assert_eq!(participants[2].id.as_str(), "c:3");
        assert_eq!(participants.iter().filter(|p| p.is_leader).count(), 1);
    }

    #[test]
    fn test_empty_children_give_no_participants() {
        assert!(participants_from(Vec::new()).is_empty());
    }
}
