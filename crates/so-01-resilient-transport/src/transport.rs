//! # Resilient Transport
//!
//! Fixed-interval retry loop around an idempotent async operation.
//!
//! ```text
//! attempt 1 ──fail──▶ sleep(interval) ──▶ attempt 2 ──fail──▶ ... ──▶ attempt N ──fail──▶ Exhausted
//!     │                                       │                          │
//!     └──ok──▶ return                         └──ok──▶ return            └──ok──▶ return
//! ```

use std::future::Future;

use tracing::{debug, error, warn};

use crate::domain::{AttemptError, RetryPolicy, TransportError};

/// Executes idempotent operations with a bounded retry budget.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResilientTransport {
    policy: RetryPolicy,
}

impl ResilientTransport {
    /// Create a transport with the given policy.
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// The active policy.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run `attempt` until it succeeds or the budget is spent.
    ///
    /// The closure is invoked once per attempt so each try gets a fresh future.
    /// No sleep follows the final attempt.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut made = 0u32;

        loop {
            made += 1;
            match attempt().await {
                Ok(value) => {
                    if made > 1 {
                        debug!(operation, attempts = made, "[so-01] Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(last) if made >= max_attempts => {
                    error!(
                        operation,
                        attempts = made,
                        error = %last,
                        "[so-01] Retry budget exhausted"
                    );
                    return Err(TransportError::Exhausted {
                        operation: operation.to_string(),
                        attempts: made,
                        last,
                    });
                }
                Err(e) => {
                    warn!(
                        operation,
                        attempt = made,
                        max_attempts,
                        error = %e,
                        "[so-01] Attempt failed, retrying"
                    );
                    tokio::time::sleep(self.policy.interval).await;
                }
            }
        }
    }
}
