//! Retry policy and executor
//!
//! Exponential backoff doubling from `initial_delay`. Attempts are counted in
//! total, so `max_attempts == 3` means one call plus up to two retries.

use std::time::Duration;
use tokio::time::sleep;

use crate::error::{LlmError, UpstreamErrorKind};

const BACKOFF_MULTIPLIER: u32 = 2;
const MAX_DELAY: Duration = Duration::from_secs(60);

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    retry_condition: fn(&LlmError) -> bool,
}

fn is_rate_limited(error: &LlmError) -> bool {
    error.upstream_kind() == Some(UpstreamErrorKind::RateLimited)
}

fn is_upstream_failure(error: &LlmError) -> bool {
    error.upstream_kind().is_some()
}

impl RetryPolicy {
    const fn with_condition(max_attempts: u32, retry_condition: fn(&LlmError) -> bool) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_secs(1),
            retry_condition,
        }
    }

    /// Hosted APIs: three attempts, retrying only on rate limiting.
    pub const fn remote() -> Self {
        Self::with_condition(3, is_rate_limited)
    }

    /// Local backends: two attempts, retrying any upstream failure.
    pub const fn local() -> Self {
        Self::with_condition(2, is_upstream_failure)
    }

    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Check if an error should be retried
    pub fn should_retry(&self, error: &LlmError) -> bool {
        (self.retry_condition)(error)
    }

    /// Delay before retrying after the zero-based `attempt` failed, capped at a minute.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        BACKOFF_MULTIPLIER
            .checked_pow(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }
}

/// Retry executor that handles the actual retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    /// Label used in retry logs
    label: &'static str,
}

impl RetryExecutor {
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            label: "operation",
        }
    }

    pub const fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or `max_attempts` is reached. The last error is returned unchanged.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, LlmError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match operation().await {
                Ok(result) => return Ok(result),
                Err(error) => error,
            };

            if !self.policy.should_retry(&error) || attempt + 1 >= max_attempts {
                return Err(error);
            }

            let delay = self.policy.calculate_delay(attempt);
            tracing::warn!(
                target: "showmyai::retry",
                label = self.label,
                attempt = attempt + 1,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Attempt failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}
