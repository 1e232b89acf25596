use std::time::Duration;

use super::provider::ProviderError;

/// Retry behaviour for rate-limited provider calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; a call makes at most `max_retries + 1` attempts.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Give up immediately when a rate limit looks like daily or billing quota exhaustion.
    pub fail_fast_on_quota_exhaustion: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay: Duration::from_secs(3),
            max_delay: Duration::from_secs(60),
            fail_fast_on_quota_exhaustion: true,
        }
    }
}

impl RetryPolicy {
    /// Whether a failure on zero-based `attempt` earns another attempt.
    pub fn should_retry(&self, error: &ProviderError, attempt: u32) -> bool {
        if !error.is_rate_limited() || attempt >= self.max_retries {
            return false;
        }
        !(self.fail_fast_on_quota_exhaustion && error.is_quota_exhausted())
    }

    /// How long to wait after a failure on zero-based `attempt`.
    ///
    /// A server hint can only lengthen the wait; the result never exceeds `max_delay`.
    pub fn delay_for(&self, error: &ProviderError, attempt: u32) -> Duration {
        let backoff = self.backoff(attempt);
        match error.retry_after() {
            Some(hint) => backoff.max(hint).min(self.max_delay),
            None => backoff,
        }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}
