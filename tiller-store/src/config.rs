//! # Store Client Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use tiller_core::store::Acl;
use tiller_core::{RetryPolicy, StoreError};

/// Credentials for the store's digest authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestCredentials {
    pub user: String,
    pub password: String,
}

impl DigestCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Renders the credentials in the `user:password` form the digest
    /// scheme expects.
    pub fn auth_payload(&self) -> String {
        format!("{}:{}", self.user, self.password)
    }
}

/// Configuration for connecting a session-backed store client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Comma-separated `host:port` list of store servers.
    pub connect_string: String,
    /// Optional digest credentials, registered before the client starts.
    pub credentials: Option<DigestCredentials>,
    /// Store session timeout.
    pub session_timeout: Duration,
    /// Per-connection timeout.
    pub connection_timeout: Duration,
    /// How long the bootstrap blocks waiting for the connected state.
    pub blocking_connect_timeout: Duration,
    /// Caller-supplied baseline ACLs. The effective default ACL is the
    /// union of these and the world-readable entry.
    pub base_acl: Vec<Acl>,
    /// Retry policy for transient store operations.
    pub retry: RetryPolicy,
}

impl StoreConfig {
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            credentials: None,
            session_timeout: Duration::from_secs(15),
            connection_timeout: Duration::from_secs(10),
            blocking_connect_timeout: Duration::from_secs(10),
            base_acl: Vec::new(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_credentials(mut self, credentials: DigestCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_blocking_connect_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_connect_timeout = timeout;
        self
    }

    pub fn with_base_acl(mut self, acl: Vec<Acl>) -> Self {
        self.base_acl = acl;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Rejects configurations that cannot produce a working client.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.connect_string.trim().is_empty() {
            return Err(StoreError::configuration("connect string must not be empty"));
        }
        if self.session_timeout.is_zero() {
            return Err(StoreError::configuration("session timeout must be positive"));
        }
        if self.blocking_connect_timeout.is_zero() {
            return Err(StoreError::configuration(
                "blocking connect timeout must be positive",
            ));
        }
        Ok(())
    }

    /// Connect string with any inline userinfo stripped, safe for logs.
    pub fn redacted_connect_string(&self) -> String {
        self.connect_string
            .split(',')
            .map(|server| match server.rsplit_once('@') {
                Some((_, host)) => format!("*****@{}", host),
                None => server.to_string(),
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
