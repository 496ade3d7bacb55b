//! Retry with exponential backoff and jitter.
//!
//! Only transient provider failures are retried; idempotency is the
//! caller's concern since model output is not deterministic anyway.

use crate::error::LlmError;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_INITIAL_DELAY_MS: u64 = 500;
const DEFAULT_MAX_DELAY_MS: u64 = 8_000;
const DEFAULT_JITTER_FACTOR: f64 = 0.5;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Randomizes each delay by up to ±(factor × delay); clamped to 0.0–1.0.
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
            jitter_factor: DEFAULT_JITTER_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter_factor: 0.0,
        }
    }

    /// Backoff before retry number `retry` (1 for the first retry).
    ///
    /// `initial_delay * 2^(retry - 1)`, capped at `max_delay`, then jittered.
    #[must_use]
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }

        let base = self
            .initial_delay
            .saturating_mul(1u32 << (retry - 1).min(16))
            .min(self.max_delay);

        let factor = self.jitter_factor.clamp(0.0, 1.0);
        if factor == 0.0 || base.is_zero() {
            return base;
        }

        // unit in [-1.0, 1.0]
        let unit = f64::from(random_u32()) / f64::from(u32::MAX) * 2.0 - 1.0;
        base.mul_f64((1.0 + unit * factor).max(0.0))
    }
}

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    /// Returns true if the failure is transient.
    fn is_retryable(&self) -> bool;

    /// Server-requested delay before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration>;
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        LlmError::retry_after(self)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or the policy's
/// attempts are used up. The closure receives the 1-based attempt number.
///
/// A server-requested `retry_after` replaces the computed backoff but is
/// still capped at `max_delay`.
///
/// # Errors
///
/// Returns the first non-retryable error, or the last error once all
/// attempts are exhausted.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() || attempt >= max_attempts => return Err(err),
            Err(err) => {
                let delay = err
                    .retry_after()
                    .map(|requested| requested.min(policy.max_delay))
                    .unwrap_or_else(|| policy.delay_for_retry(attempt));

                tracing::warn!(
                    error = %err,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Transient failure, retrying"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

fn random_u32() -> u32 {
    // Without entropy the delay is simply unjittered.
    getrandom::u32().unwrap_or(u32::MAX / 2)
}
