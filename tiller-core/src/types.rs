//! # Core Types
//!
//! Fundamental types used throughout the Tiller leader election core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a candidate participating in leader election.
///
/// Every process competing for leadership carries an identifier that is
/// unique across the cluster, conventionally the `host:port` the candidate
/// serves on. Uniqueness is a configuration precondition: if the same id
/// shows up twice among election participants, the election stream fails
/// rather than tolerating the ambiguity.
///
/// # Examples
///
/// ```rust
/// use tiller_core::CandidateId;
///
/// let id = CandidateId::new("scheduler-1.example.com:8083");
/// assert_eq!(id.as_str(), "scheduler-1.example.com:8083");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CandidateId(String);

impl CandidateId {
    /// Creates a candidate identifier from a host:port style string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CandidateId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CandidateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Leadership status observed by a single candidate.
///
/// This is the value delivered to election subscribers. Equality is
/// structural: `Standby(None)`, `Standby(Some(id))`, and
/// `ElectedAsLeader` are three distinct observations, and the event
/// stream never delivers the same observation twice in a row.
///
/// # Examples
///
/// ```rust
/// use tiller_core::{CandidateId, LeadershipState};
///
/// let leader = LeadershipState::ElectedAsLeader;
/// let standby = LeadershipState::Standby(Some(CandidateId::new("a:1")));
/// assert_ne!(leader, standby);
/// assert_ne!(standby, LeadershipState::Standby(None));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeadershipState {
    /// This candidate currently holds leadership.
    ElectedAsLeader,
    /// This candidate is not the leader; the current leader's id is
    /// included when it is known.
    Standby(Option<CandidateId>),
}

impl LeadershipState {
    /// Returns true when this observation means the local candidate leads.
    pub fn is_leader(&self) -> bool {
        matches!(self, LeadershipState::ElectedAsLeader)
    }
}

impl fmt::Display for LeadershipState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LeadershipState::ElectedAsLeader => write!(f, "LEADER"),
            LeadershipState::Standby(Some(leader)) => write!(f, "STANDBY({})", leader),
            LeadershipState::Standby(None) => write!(f, "STANDBY"),
        }
    }
}

/// One member of the election path, in sequence order.
///
/// Derived from the children of the election path: each child is an
/// ephemeral-sequenced node named `<candidate-id>-<sequence>`, and the
/// participant with the lowest sequence is flagged as leader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Candidate identifier parsed from the member node name.
    pub id: CandidateId,
    /// Whether this participant holds the lowest sequence.
    pub is_leader: bool,
}
