//! # Tiller Store - Client Bootstrap
//!
//! Builds and connects the session-backed coordination client the
//! scheduler shares across subsystems:
//!
//! - **Configuration**: connect string, session and connection timeouts,
//!   digest credentials, baseline ACLs, retry policy.
//! - **Bootstrap**: [`connect`] applies the effective ACL, registers
//!   authentication, and blocks until connected or a timeout fails the
//!   attempt.
//! - **Shared Handle**: [`SharedStoreClient`] carries ordered pre-close
//!   hooks so dependents can release coordination state before the
//!   session ends, and retry-wraps transient operations.

pub mod client;
pub mod config;

pub use client::{connect, effective_acl, HookId, PreCloseHook, SharedStoreClient};
pub use config::{DigestCredentials, StoreConfig};
