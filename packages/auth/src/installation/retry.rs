// ABOUTME: Bounded exponential-backoff retry for transient platform failures
// ABOUTME: Rejections and malformed responses are never retried

use std::future::Future;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tracing::warn;

use super::platform::PlatformResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: omnya_config::defaults::OMNYA_RETRY_MAX_ATTEMPTS,
            initial_interval: Duration::from_millis(250),
            max_elapsed: Duration::from_secs(omnya_config::defaults::OMNYA_RETRY_MAX_ELAPSED_SECS),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// Run `operation`, retrying only while it fails with a transient [`PlatformError`](super::platform::PlatformError)
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> PlatformResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PlatformResult<T>>,
{
    let backoff = ExponentialBackoff {
        initial_interval: policy.initial_interval,
        max_elapsed_time: Some(policy.max_elapsed),
        ..Default::default()
    };
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let call = operation();
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_transient() && current < max_attempts => {
                    warn!(
                        "{} failed on attempt {}/{}, retrying: {}",
                        label, current, max_attempts, e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        }
    })
    .await
}
