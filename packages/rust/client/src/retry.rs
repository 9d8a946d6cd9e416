//! Retry with exponential backoff, layered on top of the rate limiter.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use pagesmith_shared::{RateLimitConfig, Result, RetryConfig};

use crate::rate_limit::RateLimiter;

/// Backoff parameters: `delay = min(base × factor^attempt, max)`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
            backoff_factor: config.backoff_factor,
            max_delay: Duration::from_millis(config.max_delay_ms),
        }
    }
}

/// Runs API operations through the rate limiter with retry.
///
/// Every attempt, including retries, takes a rate-limit slot. Permanent errors
/// (see [`PagesmithError::is_permanent`](pagesmith_shared::PagesmithError::is_permanent))
/// are returned on the first failure.
#[derive(Debug)]
pub struct ApiExecutor {
    limiter: RateLimiter,
    policy: RetryPolicy,
}

impl ApiExecutor {
    pub fn new(limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self { limiter, policy }
    }

    pub fn from_config(rate_limit: &RateLimitConfig, retry: &RetryConfig) -> Self {
        Self::new(RateLimiter::from(rate_limit), RetryPolicy::from(retry))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `operation` until it succeeds, fails permanently, or the retry budget is spent.
    ///
    /// `label` names the operation in log output.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;

        loop {
            self.limiter.acquire().await;

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_permanent() => {
                    debug!(operation = label, error = %e, "permanent error, not retrying");
                    return Err(e);
                }
                Err(e) if attempt >= self.policy.max_retries => {
                    warn!(
                        operation = label,
                        attempts = attempt + 1,
                        error = %e,
                        "giving up after retries"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let delay = self.policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        operation = label,
                        attempt,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
