//! Retry disciplines
//!
//! Two policies, kept apart on purpose:
//! - `BoundedRetry` for request paths (chain RPC, sign status polling): a fixed
//!   number of attempts with a fixed delay, then the error surfaces.
//! - `LivenessRetry` for background liveness loops (MPC startup lookups): retries
//!   transient failures forever, but returns data errors immediately.

use crate::error::RouterResult;

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Fixed attempt count with a fixed delay between attempts
#[derive(Debug, Clone, Copy)]
pub struct BoundedRetry {
    attempts: u32,
    delay: Duration,
}

impl BoundedRetry {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or attempts run out
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> RouterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RouterResult<T>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.attempts => {
                    debug!(
                        "{} failed (attempt {}/{}): {}",
                        operation, attempt, self.attempts, e
                    );
                    tokio::time::sleep(self.delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Unbounded retry of transient failures at a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct LivenessRetry {
    interval: Duration,
}

impl LivenessRetry {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `op` until it succeeds or fails with a non-retryable error
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> RouterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RouterResult<T>>,
    {
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    warn!(
                        "{} failed, retrying in {:?}: {}",
                        operation, self.interval, e
                    );
                    tokio::time::sleep(self.interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
