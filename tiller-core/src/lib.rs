//! # Tiller Core - Leader Election Building Blocks
//!
//! Core components for the Tiller cluster scheduler's leader election:
//!
//! - **Types**: `CandidateId`, `LeadershipState`, and `Participant`, the
//!   values that flow from the coordination store to election
//!   subscribers.
//! - **Store Contract**: `CoordinationStore` and `CoordinationClient`
//!   traits over a ZooKeeper-style hierarchical store with ephemeral
//!   sequenced nodes, one-shot child watches, digest authentication,
//!   and per-path ACLs.
//! - **Error Handling**: the `StoreError` taxonomy with retryability
//!   classification.
//! - **Retry**: exponential-backoff policy for transient operations.
//!
//! The store contract is the seam between the election core and the
//! coordination service. Production deployments bind it to a real
//! store client; tests bind it to the in-memory implementation in
//! `tiller-testing`.

pub mod error;
pub mod retry;
pub mod store;
pub mod types;

// Re-export commonly used types for convenience
pub use error::*;
pub use retry::RetryPolicy;
pub use types::*;
