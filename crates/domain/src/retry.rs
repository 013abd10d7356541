//! Bounded retry for idempotent store reads.

use std::future::Future;
use std::time::Duration;

use document_store::StoreError;

/// Retry policy applied to idempotent reads.
///
/// Only errors for which [`StoreError::is_transient`] holds are retried.
/// The wait before attempt `n` is `n * backoff`. Writes never go through
/// this policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRetry {
    retries: u32,
    backoff: Duration,
}

impl ReadRetry {
    pub fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Runs `op`, retrying transient failures.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(operation, attempt, error = %err, "Transient store failure, retrying read");
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}

impl Default for ReadRetry {
    fn default() -> Self {
        Self::new(2, Duration::from_millis(50))
    }
}
