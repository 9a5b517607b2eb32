//! # Tiller Election - Leader Election Core
//!
//! Elects exactly one leader among the scheduler's candidate processes
//! using a ZooKeeper-style coordination store, and publishes the
//! current leader to a downstream subscriber as a live event stream.
//!
//! This crate provides:
//! - Leader latch over ephemeral-sequenced membership nodes
//! - A watch/poll loop compensating for one-shot child watches
//! - A bounded, deduplicated leadership event stream with an
//!   initial-connect timeout and a terminal standby event
//! - An abdication lifecycle that releases coordination state before
//!   the shared store session closes
//! - Retrieval timing metrics shared with the scheduler's reporter
//!
//! The election core is separate from the store bootstrap and focuses
//! purely on the election protocol and its event contract.

pub mod errors;
pub mod latch;
pub mod metrics;
mod observer;
pub mod service;
pub mod stream;

pub use errors::{ElectionError, ElectionResult};
pub use latch::{LatchState, LeaderLatch, LATCH_PATH_SUFFIX};
pub use metrics::{
    RetrievalTimers, TimerRegistry, TimerStats, LEGACY_RETRIEVAL_TIMER, RETRIEVAL_TIMER,
};
pub use service::{ElectionConfig, ElectionHandle, LeaderElection};
pub use stream::LeadershipEvents;
