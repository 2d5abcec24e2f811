//! Exponential backoff for transient failures.
//!
//! The caller decides which errors are transient through a classifier
//! closure; everything else is returned on the first failure.
//!
//! ```rust
//! use std::time::Duration;
//! use orderlink_common::resilience::{retry_with_backoff, BackoffPolicy};
//!
//! # tokio_test_block_on(async {
//! let policy = BackoffPolicy::new(3, Duration::from_millis(1));
//! let value: Result<u32, &str> =
//!     retry_with_backoff(&policy, |_: &&str| true, |_attempt| async { Ok(7) }).await;
//! assert_eq!(value, Ok(7));
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(f)
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Attempts cap and base delay; the delay doubles after each failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
}

impl Default for BackoffPolicy {
    /// Three attempts, waiting 1s then 2s.
    fn default() -> Self {
        Self { max_attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl BackoffPolicy {
    /// Build a policy. `max_attempts` of zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts: max_attempts.max(1), base_delay }
    }

    /// Delay to wait after the given failed attempt (1-based): base, 2x base,
    /// 4x base, ...
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the policy runs out of attempts.
///
/// `operation` receives the 1-based attempt number. The last error is
/// returned when attempts are exhausted.
pub async fn retry_with_backoff<T, E, C, F, Fut>(
    policy: &BackoffPolicy,
    is_retryable: C,
    mut operation: F,
) -> Result<T, E>
where
    C: Fn(&E) -> bool,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && is_retryable(&err) => {
                let delay = policy.delay_after(attempt);
                warn!(attempt, max_attempts, ?delay, error = %err, "Retryable failure, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
