//! Error types for leader election operations.

use thiserror::Error;
use tiller_core::StoreError;

/// Result type for leader election operations
pub type ElectionResult<T> = Result<T, ElectionError>;

/// Errors that can occur during leader election
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ElectionError {
    /// Coordination-store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The same candidate id was observed more than once among the
    /// election participants. Candidate ids must be unique across the
    /// cluster; a duplicate is a configuration bug, not a recoverable
    /// state.
    #[error("Duplicate candidate id {id} observed {count} times among election participants")]
    DuplicateCandidate { id: String, count: usize },

    /// No leadership event was produced within the connection timeout
    /// after stream start.
    #[error("No leadership event within {timeout_ms}ms of stream start")]
    ConnectionTimeout { timeout_ms: u64 },

    /// The election path never appeared while the latch was starting.
    #[error("Election path {path} still missing after {attempts} read attempts")]
    ElectionPathMissing { path: String, attempts: usize },

    /// A latch operation was issued in the wrong lifecycle state.
    #[error("Leader latch is {state}, expected {expected}")]
    InvalidLatchState { state: String, expected: String },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ElectionError {
    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ElectionError {
    fn from(err: anyhow::Error) -> Self {
        ElectionError::Internal {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_convert_transparently() {
        let err: ElectionError = StoreError::no_node("/election").into();
        assert!(matches!(err, ElectionError::Store(StoreError::NoNode { .. })));
        assert!(err.to_string().contains("/election"));
    }

    #[test]
    fn test_duplicate_candidate_display() {
        let err = ElectionError::DuplicateCandidate {
            id: "a:1".into(),
            count: 2,
        };
        assert!(err.to_string().contains("a:1"));
        assert!(err.to_string().contains('2'));
    }
}
