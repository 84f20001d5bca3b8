// Retry-with-backoff for segment requests.
//
// Exponential backoff with optional jitter and a hard cap on the delay.

use rand::RngExt;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SegmentError;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay between retries. Actual delay = base * 2^attempt + jitter.
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// When true, adds random jitter of [0, base_delay/2).
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // attempts >= 32 saturate instead of overflowing the shift
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        let capped = self
            .base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if !self.jitter {
            return capped;
        }

        let jitter_range_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX) / 2;
        let remaining_ms =
            u64::try_from(self.max_delay.saturating_sub(capped).as_millis()).unwrap_or(0);
        let jitter_limit_ms = jitter_range_ms.min(remaining_ms);
        if jitter_limit_ms == 0 {
            return capped;
        }

        let jitter_ms = rand::rng().random_range(0..jitter_limit_ms);
        (capped + Duration::from_millis(jitter_ms)).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
///
/// `operation` receives the 0-indexed attempt number.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation: F,
) -> Result<T, SegmentError>
where
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<T, SegmentError>>,
{
    let mut attempt = 0;
    loop {
        if token.is_cancelled() {
            return Err(SegmentError::Cancelled);
        }

        let err = match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if !err.is_retryable() || attempt >= policy.max_retries => return Err(err),
            Err(err) => err,
        };

        let delay = policy.delay_for_attempt(attempt);
        warn!(
            attempt = attempt + 1,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Retrying after transient error"
        );
        tokio::select! {
            _ = token.cancelled() => return Err(SegmentError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
