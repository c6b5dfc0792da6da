use hive_core::ErrorKind;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// Configures retry behaviour for transient failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts never exceed `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds for exponential backoff.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Maximum delay in milliseconds (cap for exponential backoff).
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    250
}
fn default_backoff_max_ms() -> u64 {
    5_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base_ms: 0,
            backoff_max_ms: 0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Computes the backoff delay for a given (zero-based) attempt using
/// exponential backoff capped at `backoff_max_ms`.
pub fn compute_backoff(policy: &RetryPolicy, attempt: u32) -> u64 {
    let delay = policy
        .backoff_base_ms
        .saturating_mul(2u64.saturating_pow(attempt));
    delay.min(policy.backoff_max_ms)
}

/// A classified failure of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFailure {
    pub kind: ErrorKind,
    pub detail: String,
}

impl CallFailure {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Result of a retried operation together with how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub attempts: u32,
    pub result: Result<T, CallFailure>,
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable kind, or
/// the policy is exhausted. `attempt_fn` receives the zero-based attempt index.
pub async fn retry_with_backoff<T, F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, CallFailure>>,
{
    let mut attempts = 0;
    let mut last_err = CallFailure::new(ErrorKind::TransientRemoteError, "no attempt made");

    for attempt in 0..=policy.max_retries {
        attempts = attempt + 1;
        match attempt_fn(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    attempts,
                    result: Ok(value),
                }
            }
            Err(e) => {
                if !e.kind.is_retryable() {
                    warn!(attempt, kind = %e.kind, error = %e.detail, "Non-retryable failure");
                    return RetryOutcome {
                        attempts,
                        result: Err(e),
                    };
                }

                if attempt < policy.max_retries {
                    let delay = compute_backoff(policy, attempt);
                    info!(
                        attempt,
                        delay_ms = delay,
                        kind = %e.kind,
                        error = %e.detail,
                        "Retryable failure, backing off"
                    );
                    if delay > 0 {
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                    }
                }
                last_err = e;
            }
        }
    }

    warn!(attempts, kind = %last_err.kind, "Retries exhausted");
    RetryOutcome {
        attempts,
        result: Err(last_err),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_computation() {
        let policy = RetryPolicy {
            max_retries: 5,
            backoff_base_ms: 250,
            backoff_max_ms: 5_000,
        };

        assert_eq!(compute_backoff(&policy, 0), 250);
        assert_eq!(compute_backoff(&policy, 1), 500);
        assert_eq!(compute_backoff(&policy, 2), 1000);
        assert_eq!(compute_backoff(&policy, 3), 2000);
        assert_eq!(compute_backoff(&policy, 4), 4000);
        assert_eq!(compute_backoff(&policy, 5), 5000); // capped at max
        assert_eq!(compute_backoff(&policy, 63), 5000);
    }

    #[tokio::test]
    async fn succeeds_on_third_attempt() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_backoff(&RetryPolicy::immediate(2), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CallFailure::new(ErrorKind::TransientRemoteError, "503"))
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result.unwrap(), "done");
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = retry_with_backoff(&RetryPolicy::immediate(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallFailure::new(ErrorKind::PermanentRemoteError, "401")) }
        })
        .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::PermanentRemoteError);
    }

    #[tokio::test]
    async fn attempts_never_exceed_policy() {
        for max_retries in 0..4 {
            let calls = AtomicU32::new(0);
            let outcome: RetryOutcome<()> =
                retry_with_backoff(&RetryPolicy::immediate(max_retries), |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(CallFailure::new(ErrorKind::Timeout, "slow")) }
                })
                .await;
            assert_eq!(outcome.attempts, max_retries + 1);
            assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
            assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::Timeout);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff_base_ms: 100,
            backoff_max_ms: 1_000,
        };
        let start = tokio::time::Instant::now();
        let _: RetryOutcome<()> = retry_with_backoff(&policy, |_| async {
            Err(CallFailure::new(ErrorKind::TransientRemoteError, "reset"))
        })
        .await;
        // 100ms after attempt 0, 200ms after attempt 1, none after the last.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
    }
}
