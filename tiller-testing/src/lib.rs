//! # Tiller Testing
//!
//! Test infrastructure for the leader election core: an in-memory
//! coordination store with real session semantics (ephemeral-sequenced
//! nodes, one-shot child watches, expiry) and fault-injection switches
//! for connect stalls and missing-path bursts. The integration suites
//! under `tests/` drive whole elections against it.

pub mod harness;
pub mod store;

pub use store::{InMemoryClient, InMemoryStore};
