//! Bounded retry around flaky CLI operations
//!
//! VM provisioning fails transiently for reasons unrelated to correctness
//! (eventual consistency on the backend). [`RetryPolicy`] re-invokes such an
//! operation a bounded number of times with a fixed delay in between and hands
//! the last result back to the caller, who decides success or failure.
//!
//! Harness errors (spawn failures, missing replay fixtures) are never retried.

use crate::command::CommandResult;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Default attempt budget for VM creation
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay between VM creation attempts in live runs
pub const DEFAULT_DELAY: Duration = Duration::from_secs(5);

/// Retry classification for a command result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation
    Retry,
    /// Return the result as is
    Stop,
}

/// Classifier deciding whether a result warrants another attempt
pub type ResultClassifier = fn(&CommandResult) -> RetryDecision;

/// Default classifier: retry every nonzero exit status
pub fn retry_on_failure(result: &CommandResult) -> RetryDecision {
    if result.success() {
        RetryDecision::Stop
    } else {
        RetryDecision::Retry
    }
}

/// Attempt budget and inter-attempt delay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of invocations allowed, including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_DELAY)
    }
}

/// Mutable state of one [`RetryPolicy::run`] invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    pub remaining_attempts: u32,
    pub delay: Duration,
}

/// Result of a retried operation with the number of invocations it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOutcome {
    pub result: CommandResult,
    pub attempts: u32,
}

impl RetryPolicy {
    /// Create a policy; at least one attempt is always made
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Same budget without any waiting, used for replay runs
    pub fn without_delay(self) -> Self {
        Self {
            delay: Duration::ZERO,
            ..self
        }
    }

    /// Attempt budget actually used; a zero budget still makes one attempt
    fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn initial_state(&self) -> RetryState {
        RetryState {
            remaining_attempts: self.attempt_budget(),
            delay: self.delay,
        }
    }

    /// Run `operation` until it succeeds or the attempt budget is spent
    pub async fn run<Op, Fut>(&self, operation: Op) -> Result<RetryOutcome>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<CommandResult>>,
    {
        self.run_with_classifier(operation, retry_on_failure).await
    }

    /// Run `operation`, retrying while `classify` says so
    #[instrument(
        level = "debug",
        skip(self, operation, classify),
        fields(max_attempts = self.attempt_budget())
    )]
    pub async fn run_with_classifier<Op, Fut>(
        &self,
        mut operation: Op,
        classify: ResultClassifier,
    ) -> Result<RetryOutcome>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<CommandResult>>,
    {
        let mut state = self.initial_state();
        let mut attempts = 0;

        loop {
            attempts += 1;
            state.remaining_attempts = state.remaining_attempts.saturating_sub(1);
            debug!("Attempt {} of {}", attempts, self.attempt_budget());

            let result = operation().await?;

            if classify(&result) == RetryDecision::Stop {
                if attempts > 1 {
                    debug!("Operation settled on attempt {}", attempts);
                }
                return Ok(RetryOutcome { result, attempts });
            }

            if state.remaining_attempts == 0 {
                warn!(
                    exit_status = result.exit_status,
                    "All {} attempts exhausted", attempts
                );
                return Ok(RetryOutcome { result, attempts });
            }

            warn!(
                exit_status = result.exit_status,
                remaining = state.remaining_attempts,
                "Attempt {} failed, retrying in {:?}",
                attempts,
                state.delay
            );
            if !state.delay.is_zero() {
                tokio::time::sleep(state.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ExecError, ProvcheckError};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay, Duration::from_secs(5));
        assert_eq!(policy.without_delay().delay, Duration::ZERO);
    }

    #[test]
    fn test_zero_attempts_clamped() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_zero_attempt_literal_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            delay: Duration::ZERO,
        };
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = policy
            .run(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProvcheckError>(CommandResult::failed("busy"))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn test_always_failing_operation_runs_max_attempts() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = policy
            .run(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ProvcheckError>(CommandResult::failed("provisioning conflict"))
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.result.exit_status, 1);
        assert_eq!(outcome.result.text, "provisioning conflict");
    }

    #[tokio::test]
    async fn test_success_on_third_attempt() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = policy
            .run(|| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    let result = if n < 3 {
                        CommandResult::failed(format!("attempt {}", n))
                    } else {
                        CommandResult::ok(format!("attempt {}", n))
                    };
                    Ok::<_, ProvcheckError>(result)
                }
            })
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(outcome.result, CommandResult::ok("attempt 3"));
    }

    #[tokio::test]
    async fn test_harness_error_is_not_retried() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        let err = policy
            .run(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err::<CommandResult, _>(ProvcheckError::from(ExecError::FixtureMismatch {
                        command: "vm create".to_string(),
                        correlation_id: "4".to_string(),
                    }))
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ProvcheckError::Exec(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        let outcome = policy
            .run(|| async { Ok::<_, ProvcheckError>(CommandResult::failed("")) })
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        // Two pauses: no sleep after the final attempt
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_custom_classifier_stops_early() {
        let policy = RetryPolicy::new(5, Duration::ZERO);
        let calls = Arc::new(AtomicU32::new(0));

        fn retry_only_exit_one(result: &CommandResult) -> RetryDecision {
            if result.exit_status == 1 {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }

        let outcome = policy
            .run_with_classifier(
                || {
                    let calls = Arc::clone(&calls);
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, ProvcheckError>(CommandResult::new(2, "usage error"))
                    }
                },
                retry_only_exit_one,
            )
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.result.exit_status, 2);
    }
}
