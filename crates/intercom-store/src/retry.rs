//! Retry policy for the document store.
//!
//! Two independent budgets, never conflated:
//!
//! - **Version conflicts** are retried by re-reading and re-applying the
//!   caller's mutation from scratch (driven by the store, not here).
//! - **Transient infrastructure faults** are retried as the identical
//!   operation with doubling backoff, since nothing was applied.
//!
//! Both budgets are bounded; unbounded retry is explicitly not offered.

use crate::backend::BackendError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts for a conditional update before reporting conflict
    /// exhaustion.
    pub max_conflict_attempts: u32,
    /// Attempts for a single backend operation across transient faults.
    pub max_transient_attempts: u32,
    /// First transient-retry delay; doubles on each subsequent attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_conflict_attempts: 3,
            max_transient_attempts: 3,
            base_delay: Duration::from_millis(25),
        }
    }
}

impl RetryPolicy {
    /// The backoff delay before transient attempt `attempt` (zero-based
    /// count of failures so far).
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run a backend operation, retrying only transient faults.
    ///
    /// Any other error propagates unchanged on the first occurrence; the
    /// last transient error propagates once the budget is spent.
    pub async fn run_transient<T, F, Fut>(&self, op_name: &str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(BackendError::Transient(msg)) => {
                    attempt += 1;
                    if attempt >= self.max_transient_attempts {
                        return Err(BackendError::Transient(msg));
                    }
                    let delay = self.backoff(attempt - 1);
                    warn!(
                        op = op_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %msg,
                        "Transient store fault, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(25));
        assert_eq!(policy.backoff(1), Duration::from_millis(50));
        assert_eq!(policy.backoff(2), Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_transient_faults_are_retried() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result = policy
            .run_transient("load", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(BackendError::Transient("reset".into()))
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_budget_exhausts() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run_transient("load", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::Transient("timeout".into())) }
            })
            .await;

        assert!(matches!(result, Err(BackendError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_propagate_immediately() {
        let policy = fast_policy();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .run_transient("insert", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(BackendError::Internal("schema".into())) }
            })
            .await;

        assert!(matches!(result, Err(BackendError::Internal(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
