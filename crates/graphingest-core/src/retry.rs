//! Bounded retry for batch writes

use std::time::Duration;

use crate::error::StoreError;

/// How often a batch write is attempted before it is reported as failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    /// Total attempts including the first; 1 disables retry
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on every further retry
    pub backoff: Duration,
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::ZERO,
        }
    }
}

impl WritePolicy {
    /// Delay before retry number `retry` (1-based): backoff, 2×backoff, 4×backoff, ...
    pub fn backoff_duration(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }
}

/// Final error of a write together with how many attempts were made.
#[derive(Debug)]
pub struct Exhausted {
    pub attempts: u32,
    pub error: StoreError,
}

/// Retry a fallible store write up to `policy.max_attempts` times.
///
/// Errors the store reports as non-retryable fail immediately.
/// Returns `Ok(T)` on first success, or the final error on exhaustion.
pub fn retry_write<T>(
    label: &str,
    policy: &WritePolicy,
    mut attempt_fn: impl FnMut() -> Result<T, StoreError>,
) -> Result<T, Exhausted> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1u32;
    loop {
        match attempt_fn() {
            Ok(v) => return Ok(v),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                log::warn!("{label}: attempt {attempt}/{max_attempts} failed: {e}, retrying...");
                std::thread::sleep(policy.backoff_duration(attempt));
                attempt += 1;
            }
            Err(e) => {
                log::error!("{label}: failed after {attempt} attempt(s): {e}");
                return Err(Exhausted {
                    attempts: attempt,
                    error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transient() -> StoreError {
        StoreError::Rejected {
            code: "Neo.TransientError.Transaction.DeadlockDetected".into(),
            message: "deadlock".into(),
        }
    }

    #[test]
    fn backoff_doubles() {
        let policy = WritePolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_duration(3), Duration::from_millis(400));
    }

    #[test]
    fn default_allows_one_retry() {
        let mut calls = 0;
        let result = retry_write("t", &WritePolicy::default(), || {
            calls += 1;
            if calls == 1 { Err(transient()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 2);
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut calls = 0;
        let result: Result<(), _> = retry_write("t", &WritePolicy::default(), || {
            calls += 1;
            Err(transient())
        });
        let err = result.unwrap_err();
        assert_eq!(err.attempts, 2);
        assert_eq!(calls, 2);
    }

    #[test]
    fn single_attempt_disables_retry() {
        let policy = WritePolicy {
            max_attempts: 1,
            ..Default::default()
        };
        let mut calls = 0;
        let result: Result<(), _> = retry_write("t", &policy, || {
            calls += 1;
            Err(transient())
        });
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }

    #[test]
    fn non_retryable_fails_immediately() {
        let mut calls = 0;
        let result: Result<(), _> = retry_write("t", &WritePolicy::default(), || {
            calls += 1;
            Err(StoreError::Rejected {
                code: "Neo.ClientError.Statement.SyntaxError".into(),
                message: "bad".into(),
            })
        });
        assert_eq!(result.unwrap_err().attempts, 1);
        assert_eq!(calls, 1);
    }
}
