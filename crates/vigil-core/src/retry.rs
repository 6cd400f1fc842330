// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policies and the attempt executor.
//!
//! [`execute_activity`] runs a side-effecting call under [`ActivityOptions`]:
//! every attempt gets a start-to-close ceiling and, optionally, a heartbeat
//! timeout. Failed, timed-out or stalled attempts are abandoned and retried
//! according to the [`RetryPolicy`] until one succeeds, the policy runs out of
//! attempts, or the cancellation token fires.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::heartbeat::{self, Heartbeat};

/// Exponential backoff policy.
///
/// The delay before retry `n` (1-indexed) is
/// `initial_interval * backoff_coefficient^(n-1)`, capped at
/// `maximum_interval`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_coefficient: f64,
    /// Upper bound for any single delay.
    pub maximum_interval: Duration,
    /// Maximum number of attempts, counting the first one. 0 = unlimited.
    pub maximum_attempts: u32,
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(
        initial_interval: Duration,
        backoff_coefficient: f64,
        maximum_interval: Duration,
        maximum_attempts: u32,
    ) -> Self {
        Self {
            initial_interval,
            backoff_coefficient,
            maximum_interval,
            maximum_attempts,
        }
    }

    /// Run exactly once, never retry.
    pub fn single_attempt() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether the given attempt number (1-indexed) may run.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.maximum_attempts == 0 || attempt <= self.maximum_attempts
    }

    /// Calculate delay before a given retry (1-indexed).
    ///
    /// Retry 1 follows the initial failure.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = secs.min(self.maximum_interval.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.maximum_interval)
    }
}

impl Default for RetryPolicy {
    /// 1s, x5, capped at 100s, unlimited attempts.
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 5.0,
            maximum_interval: Duration::from_secs(100),
            maximum_attempts: 0,
        }
    }
}

/// Execution limits for one side-effecting call.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    /// Ceiling for a single attempt.
    pub start_to_close_timeout: Duration,
    /// Maximum silence between heartbeats before an attempt is abandoned.
    pub heartbeat_timeout: Option<Duration>,
    /// What to do after a failed attempt.
    pub retry_policy: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            start_to_close_timeout: Duration::from_secs(60 * 60),
            heartbeat_timeout: Some(Duration::from_secs(60)),
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    /// Set the per-attempt ceiling.
    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }

    /// Set the heartbeat timeout. `None` disables stall detection.
    pub fn with_heartbeat_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }
}

/// Per-attempt context handed to the activity body.
#[derive(Debug, Clone)]
pub struct ActivityContext {
    attempt: u32,
    heartbeat: Heartbeat,
}

impl ActivityContext {
    /// Attempt number, starting at 1.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Heartbeat handle for this attempt.
    pub fn heartbeat(&self) -> &Heartbeat {
        &self.heartbeat
    }
}

/// Why a single attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure<E> {
    /// The activity body returned an error.
    Failed(E),
    /// The attempt hit its start-to-close timeout.
    TimedOut,
    /// The attempt stopped heartbeating.
    HeartbeatTimeout,
}

impl<E: fmt::Display> fmt::Display for AttemptFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(e) => write!(f, "{}", e),
            Self::TimedOut => f.write_str("start-to-close timeout"),
            Self::HeartbeatTimeout => f.write_str("heartbeat timeout"),
        }
    }
}

/// Terminal outcome of an activity that never succeeded.
#[derive(Debug)]
pub enum ActivityError<E> {
    /// The cancellation token fired.
    Cancelled {
        /// Attempts started before cancellation.
        attempts: u32,
    },
    /// The retry policy ran out of attempts.
    AttemptsExhausted {
        /// Attempts made.
        attempts: u32,
        /// Failure of the final attempt.
        last: AttemptFailure<E>,
    },
}

impl<E: fmt::Display> fmt::Display for ActivityError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled { attempts } => {
                write!(f, "activity cancelled after {} attempt(s)", attempts)
            }
            Self::AttemptsExhausted { attempts, last } => {
                write!(f, "activity failed after {} attempt(s): {}", attempts, last)
            }
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for ActivityError<E> {}

/// Run `body` until an attempt succeeds.
///
/// Each attempt receives a fresh [`ActivityContext`]. An attempt that exceeds
/// `start_to_close_timeout`, or that goes `heartbeat_timeout` without a pulse,
/// is dropped and counts as failed. Cancellation is honoured both while an
/// attempt runs and while waiting for the next one.
pub async fn execute_activity<T, E, F, Fut>(
    name: &str,
    options: &ActivityOptions,
    cancel: &CancellationToken,
    mut body: F,
) -> Result<T, ActivityError<E>>
where
    F: FnMut(ActivityContext) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt: u32 = 1;

    loop {
        let (heartbeat, mut monitor) = heartbeat::channel();
        let ctx = ActivityContext { attempt, heartbeat };

        debug!(activity = name, attempt, "Starting attempt");

        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                return Err(ActivityError::Cancelled { attempts: attempt });
            }

            result = body(ctx) => result.map_err(AttemptFailure::Failed),

            _ = tokio::time::sleep(options.start_to_close_timeout) => {
                Err(AttemptFailure::TimedOut)
            }

            _ = monitor.stalled(options.heartbeat_timeout) => {
                Err(AttemptFailure::HeartbeatTimeout)
            }
        };

        let failure = match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(activity = name, attempt, "Activity succeeded after retries");
                }
                return Ok(value);
            }
            Err(failure) => failure,
        };

        if !options.retry_policy.allows_attempt(attempt.saturating_add(1)) {
            warn!(
                activity = name,
                attempt,
                error = %failure,
                "Attempt failed; no attempts left"
            );
            return Err(ActivityError::AttemptsExhausted {
                attempts: attempt,
                last: failure,
            });
        }

        let delay = options.retry_policy.delay_for_attempt(attempt);
        warn!(
            activity = name,
            attempt,
            retry_in_ms = delay.as_millis() as u64,
            error = %failure,
            "Attempt failed; retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(ActivityError::Cancelled { attempts: attempt });
            }
            _ = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.initial_interval, Duration::from_secs(1));
        assert_eq!(policy.backoff_coefficient, 5.0);
        assert_eq!(policy.maximum_interval, Duration::from_secs(100));
        assert_eq!(policy.maximum_attempts, 0);
    }

    #[test]
    fn test_retry_policy_delay_calculation() {
        let policy = RetryPolicy::default();

        // 1s * 5^0, 1s * 5^1, 1s * 5^2, then capped at 100s
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(25));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(100));
        assert_eq!(policy.delay_for_attempt(1_000), Duration::from_secs(100));
    }

    #[test]
    fn test_allows_attempt() {
        let unlimited = RetryPolicy::default();
        assert!(unlimited.allows_attempt(u32::MAX));

        let once = RetryPolicy::single_attempt();
        assert!(once.allows_attempt(1));
        assert!(!once.allows_attempt(2));
    }

    #[test]
    fn test_activity_options_default() {
        let options = ActivityOptions::default();
        assert_eq!(options.start_to_close_timeout, Duration::from_secs(3600));
        assert_eq!(options.heartbeat_timeout, Some(Duration::from_secs(60)));
        assert_eq!(options.retry_policy, RetryPolicy::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success_with_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let options = ActivityOptions::default();
        let cancel = CancellationToken::new();
        let started = tokio::time::Instant::now();

        let counter = calls.clone();
        let result: Result<u32, ActivityError<String>> =
            execute_activity("flaky", &options, &cancel, move |ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    if ctx.attempt() < 4 {
                        Err(format!("attempt {} failed", ctx.attempt()))
                    } else {
                        Ok(ctx.attempt())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // 1s + 5s + 25s of backoff
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(31));
        assert!(elapsed < Duration::from_secs(32));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_exhausts() {
        let options = ActivityOptions::default().with_retry_policy(RetryPolicy::single_attempt());
        let cancel = CancellationToken::new();

        let result: Result<(), ActivityError<&str>> =
            execute_activity("once", &options, &cancel, |_ctx| async { Err("boom") }).await;

        match result {
            Err(ActivityError::AttemptsExhausted { attempts, last }) => {
                assert_eq!(attempts, 1);
                assert_eq!(last, AttemptFailure::Failed("boom"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_attempt_is_abandoned() {
        let options = ActivityOptions::default()
            .with_heartbeat_timeout(Some(Duration::from_secs(5)))
            .with_retry_policy(RetryPolicy::single_attempt());
        let cancel = CancellationToken::new();

        let result: Result<(), ActivityError<String>> =
            execute_activity("silent", &options, &cancel, |_ctx| {
                std::future::pending::<Result<(), String>>()
            })
            .await;

        assert!(matches!(
            result,
            Err(ActivityError::AttemptsExhausted {
                last: AttemptFailure::HeartbeatTimeout,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_to_close_timeout() {
        let options = ActivityOptions::default()
            .with_start_to_close_timeout(Duration::from_secs(10))
            .with_heartbeat_timeout(None)
            .with_retry_policy(RetryPolicy::single_attempt());
        let cancel = CancellationToken::new();

        let result: Result<(), ActivityError<String>> =
            execute_activity("slow", &options, &cancel, |_ctx| {
                std::future::pending::<Result<(), String>>()
            })
            .await;

        assert!(matches!(
            result,
            Err(ActivityError::AttemptsExhausted {
                last: AttemptFailure::TimedOut,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let options = ActivityOptions::default();
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            canceller.cancel();
        });

        let result: Result<(), ActivityError<&str>> =
            execute_activity("never", &options, &cancel, |_ctx| async { Err("down") }).await;

        // Attempts at t=0, t=1; cancelled while waiting 5s for the third.
        match result {
            Err(ActivityError::Cancelled { attempts }) => assert_eq!(attempts, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
