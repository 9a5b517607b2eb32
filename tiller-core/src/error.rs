//! # Error Types
//!
//! Error taxonomy for coordination-store operations.

use thiserror::Error;

/// Errors surfaced by a coordination store or its client handle.
///
/// Variants carry enough context to decide between retrying, treating a
/// read as empty, and failing the election stream outright. The
/// [`is_retryable`](StoreError::is_retryable) classification drives the
/// retry policy applied to transient operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The connection to the store was lost or refused; the session may
    /// still be recovered by the client.
    #[error("Connection error: {message}")]
    ConnectionLoss { message: String },

    /// The client did not reach the connected state within the blocking
    /// connect deadline.
    #[error("Timed out after {waited_ms}ms waiting for store connection")]
    ConnectTimeout { waited_ms: u64 },

    /// The store session expired; ephemeral nodes owned by it are gone.
    #[error("Session expired: {message}")]
    SessionExpired { message: String },

    /// A watched or read path does not exist.
    #[error("Node not found: {path}")]
    NoNode { path: String },

    /// A create collided with an existing node.
    #[error("Node already exists: {path}")]
    NodeExists { path: String },

    /// Authentication with the store was rejected.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// An operation exceeded its time limit.
    #[error("Timeout occurred: {operation}")]
    Timeout { operation: String },

    /// The supplied configuration is unusable.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Type alias for results of coordination-store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Creates a new connection-loss error with the given message.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::ConnectionLoss {
            message: message.into(),
        }
    }

    /// Creates a new session-expired error with the given message.
    pub fn session_expired(message: impl Into<String>) -> Self {
        Self::SessionExpired {
            message: message.into(),
        }
    }

    /// Creates a new no-node error for the given path.
    pub fn no_node(path: impl Into<String>) -> Self {
        Self::NoNode { path: path.into() }
    }

    /// Creates a new configuration error with the given message.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new internal error with the given message.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Determines whether the operation that produced this error may be
    /// retried against the same store.
    ///
    /// Connection loss and operation timeouts are transient. Session
    /// expiry is not: the ephemerals are already gone and the caller has
    /// to rebuild its state on a fresh session.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use tiller_core::StoreError;
    ///
    /// assert!(StoreError::connection("broken pipe").is_retryable());
    /// assert!(!StoreError::no_node("/election").is_retryable());
    /// assert!(!StoreError::session_expired("lapsed").is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss { .. } | Self::Timeout { .. }
        )
    }
}
