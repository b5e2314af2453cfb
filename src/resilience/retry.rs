//! # Retry Executor
//!
//! Bounded exponential backoff with jitter for transient dependency
//! faults. The executor owns only the retry loop; admission (breaker,
//! rate limit) happens inside the per-attempt closure supplied by the
//! caller, so every attempt is re-admitted rather than just the first.
//!
//! Retryability is decided by [`crate::error::ErrorClass`]: transient
//! faults, timeouts, and rate-limit denials are retried; permanent
//! failures and breaker rejections stop the loop immediately.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RetrySettings;
use crate::constants::defaults;
use crate::error::{Result, VigilError};

/// Backoff policy: delay before attempt k+1 after a failed attempt k
/// (1-indexed) is `min(max_delay, base * multiplier^(k-1))`, then widened
/// by up to ±`jitter` so synchronized clients fan out.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per run, including the first
    pub max_attempts: u32,
    /// Base delay after the first failed attempt
    pub base_delay: Duration,
    /// Exponential growth factor
    pub multiplier: f64,
    /// Delay ceiling
    pub max_delay: Duration,
    /// Symmetric jitter fraction in [0, 1)
    pub jitter: f64,
}

impl RetryPolicy {
    /// Convert from the YAML settings form
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
            multiplier: settings.multiplier,
            max_delay: settings.max_delay(),
            jitter: settings.jitter,
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jittered = capped * (1.0 + self.jitter * (2.0 * fastrand::f64() - 1.0));
        Duration::from_secs_f64(jittered.max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            multiplier: defaults::RETRY_MULTIPLIER,
            max_delay: Duration::from_millis(defaults::RETRY_MAX_DELAY_MS),
            jitter: defaults::RETRY_JITTER,
        }
    }
}

/// One failed attempt inside a retry loop
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// 1-indexed attempt number
    pub attempt: u32,
    pub error: VigilError,
}

/// Everything the retry loop observed: the final result, how many
/// attempts ran, and every failure along the way (including the final
/// one when the result is an error).
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T>,
    pub attempts: u32,
    pub failures: Vec<AttemptFailure>,
}

impl<T> RetryReport<T> {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    /// The error that ended the loop, when it failed
    pub fn last_error(&self) -> Option<&VigilError> {
        self.result.as_ref().err()
    }
}

/// Drives per-attempt closures to completion under a [`RetryPolicy`]
#[derive(Debug, Default)]
pub struct RetryExecutor;

impl RetryExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `attempt_fn` until it succeeds, a non-retryable error occurs,
    /// or the policy's attempt budget is exhausted.
    ///
    /// The closure receives the 1-indexed attempt number and is invoked
    /// sequentially, never concurrently with itself.
    pub async fn run<T, F, Fut>(
        &self,
        source: &str,
        policy: &RetryPolicy,
        mut attempt_fn: F,
    ) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut failures = Vec::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match attempt_fn(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            source = %source,
                            attempt = attempt,
                            "Operation recovered after retry"
                        );
                    }
                    return RetryReport {
                        result: Ok(value),
                        attempts: attempt,
                        failures,
                    };
                }
                Err(error) => {
                    failures.push(AttemptFailure {
                        attempt,
                        error: error.clone(),
                    });

                    if !error.is_retryable() {
                        debug!(
                            source = %source,
                            attempt = attempt,
                            class = %error.class(),
                            "Error is not retryable; stopping"
                        );
                        return RetryReport {
                            result: Err(error),
                            attempts: attempt,
                            failures,
                        };
                    }

                    if attempt >= policy.max_attempts {
                        warn!(
                            source = %source,
                            attempts = attempt,
                            error = %error,
                            "Retry budget exhausted"
                        );
                        return RetryReport {
                            result: Err(error),
                            attempts: attempt,
                            failures,
                        };
                    }

                    let delay = policy.delay_for_attempt(attempt);
                    debug!(
                        source = %source,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        class = %error.class(),
                        "Backing off before next attempt"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
