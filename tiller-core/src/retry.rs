//! # Retry Policy
//!
//! Exponential-backoff retry for transient store operations.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[cfg_attr(not(test), allow(unused_imports))]
use crate::error::{Result, StoreError};

/// Exponential-backoff retry policy applied to transient store
/// operations.
///
/// The default matches the election client bootstrap: base delay of one
/// second, ten retries, doubling per attempt, capped at thirty seconds.
/// Only errors classified retryable by
/// [`StoreError::is_retryable`] are retried; everything else propagates
/// immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: usize,
    /// Multiplier applied to the delay on each subsequent retry.
    pub backoff_multiplier: f64,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries: 10,
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Returns the delay to apply before retry number `attempt`, where
    /// the first retry is attempt 1.
    pub fn delay_for(&self, attempt: usize) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.base_delay.mul_f64(factor);
        delay.min(self.max_delay)
    }

    /// Runs `op`, retrying on retryable errors until it succeeds, a
    /// non-retryable error occurs, or the retry budget is spent.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0usize;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = self.delay_for(attempt);
                    warn!(
                        "Retrying {} after transient error (attempt {}/{}, backing off {:?}): {}",
                        operation, attempt, self.max_retries, delay, err
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
