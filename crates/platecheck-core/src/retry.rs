//! Retry with exponential backoff for transient upstream failures.
//!
//! Wraps any [`Fetcher`] and re-issues a request when it fails with an error
//! for which [`AppError::is_retryable`] holds (timeouts, connection failures,
//! 5xx and 429). Other errors are returned after the first attempt.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use platecheck_core::retry::{RetryPolicy, RetryingFetcher};
//!
//! # use platecheck_core::traits::Fetcher;
//! # use platecheck_core::request::HttpRequest;
//! # use platecheck_core::error::AppError;
//! # #[derive(Clone)] struct MyFetcher;
//! # impl Fetcher for MyFetcher {
//! #     async fn fetch(&self, _: &HttpRequest) -> Result<String, AppError> { todo!() }
//! # }
//! let policy = RetryPolicy::new(3).with_base_delay(Duration::from_millis(500));
//! let fetcher = RetryingFetcher::new(MyFetcher, policy);
//! ```

use std::time::Duration;

use crate::error::AppError;
use crate::request::HttpRequest;
use crate::traits::Fetcher;

/// How many times to try and how long to wait in between.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one. Zero is treated as one.
    pub max_attempts: u32,

    /// Delay before the second attempt; doubles for each further attempt.
    pub base_delay: Duration,

    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// No waiting between attempts. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given (1-based) failed attempt: `base * 2^(attempt-1)`, capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    /// 3 attempts, 1s base delay, capped at 8s.
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// A [`Fetcher`] wrapper that retries transient failures.
///
/// Dropping the returned future cancels any pending attempt or backoff sleep.
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, request: &HttpRequest) -> Result<String, AppError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.fetch(request).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.policy.delay_for_attempt(attempt);
                    tracing::warn!(
                        %request,
                        attempt,
                        max_attempts,
                        delay_ms = %delay.as_millis(),
                        error = %e,
                        "Transient upstream failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if attempt > 1 {
                        tracing::debug!(%request, attempt, error = %e, "Giving up");
                    }
                    return Err(e);
                }
            }
        }
    }
}
