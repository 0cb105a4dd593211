//! Bounded retry with randomized backoff for coordination reads

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::config::CoordinationConfig;
use crate::error::Result;

/// Retry settings for simple coordination reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Upper bound of the random delay between attempts
    pub max_jitter: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self {
            max_attempts: config.member_fetch_attempts.max(1),
            max_jitter: config.member_fetch_max_jitter(),
        }
    }

    /// Single attempt, no delay
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            max_jitter: Duration::ZERO,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CoordinationConfig::default())
    }
}

/// Run `operation`, retrying only retryable errors until attempts run out.
///
/// Structural errors (e.g. a missing group) are returned immediately.
pub async fn retry_transient<T, F, Fut>(policy: RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let max_ms = policy.max_jitter.as_millis() as u64;
                let delay_ms = rand::rng().random_range(0..=max_ms);
                warn!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms,
                    "{} failed, retrying",
                    what
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
