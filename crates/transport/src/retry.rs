//! Retry policy: attempt budget, back-off schedule, and rate-limit waits.

use std::time::Duration;

use chrono::{DateTime, Utc};
use pt_domain::config::RetryConfig;
use pt_domain::error::{Error, Result};
use pt_domain::RateLimitInfo;
use rand::Rng;

/// Upper bound (exclusive) of the jitter fraction added to a back-off.
const MAX_JITTER: f64 = 0.5;

/// Immutable retry configuration owned by one [`Transport`](crate::Transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, not retries after the first.
    pub max_retries: u32,
    pub retry_wait_min: Duration,
    pub retry_wait_max: Duration,
    pub rate_limit_max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_wait_min: Duration::from_secs(1),
            retry_wait_max: Duration::from_secs(5),
            rate_limit_max_wait: Duration::from_secs(5 * 60),
        }
    }
}

impl RetryPolicy {
    // Setters ignore zero so a partially filled override never disables
    // retries or produces a zero wait.

    pub fn with_max_retries(mut self, n: u32) -> Self {
        if n > 0 {
            self.max_retries = n;
        }
        self
    }

    pub fn with_retry_wait_min(mut self, d: Duration) -> Self {
        if !d.is_zero() {
            self.retry_wait_min = d;
        }
        self
    }

    pub fn with_retry_wait_max(mut self, d: Duration) -> Self {
        if !d.is_zero() {
            self.retry_wait_max = d;
        }
        self
    }

    pub fn with_rate_limit_max_wait(mut self, d: Duration) -> Self {
        if !d.is_zero() {
            self.rate_limit_max_wait = d;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::InvalidArgument("max_retries must be at least 1".into()));
        }
        if self.retry_wait_min.is_zero() || self.rate_limit_max_wait.is_zero() {
            return Err(Error::InvalidArgument("retry waits must be positive".into()));
        }
        if self.retry_wait_max < self.retry_wait_min {
            return Err(Error::InvalidArgument(format!(
                "retry_wait_max ({:?}) must be >= retry_wait_min ({:?})",
                self.retry_wait_max, self.retry_wait_min
            )));
        }
        Ok(())
    }

    /// Back-off for a network error or 5xx after the given 0-based attempt,
    /// with a uniformly drawn jitter fraction in `[0, 0.5)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let jitter = rand::rng().random_range(0.0..MAX_JITTER);
        self.backoff_with_jitter(attempt, jitter)
    }

    /// `min(retry_wait_max, retry_wait_min * 2^attempt) * (1 + jitter)`.
    pub fn backoff_with_jitter(&self, attempt: u32, jitter: f64) -> Duration {
        let base = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.retry_wait_min.checked_mul(factor))
            .unwrap_or(self.retry_wait_max)
            .min(self.retry_wait_max);
        base.mul_f64(1.0 + jitter.clamp(0.0, MAX_JITTER))
    }

    /// How long to park a request after a 429.
    ///
    /// `reset - now`, capped at `rate_limit_max_wait`. When that is not
    /// positive (reset header missing, or already in the past) the wait
    /// falls back to `retry_wait_min`.
    pub fn rate_limit_wait(&self, info: &RateLimitInfo, now: DateTime<Utc>) -> Duration {
        let until_reset = info
            .reset
            .and_then(|reset| (reset - now).to_std().ok())
            .filter(|d| !d.is_zero());

        match until_reset {
            Some(d) => d.min(self.rate_limit_max_wait),
            None => self.retry_wait_min,
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = Error;

    fn try_from(cfg: &RetryConfig) -> Result<Self> {
        let policy = Self {
            max_retries: cfg.max_retries,
            retry_wait_min: Duration::from_millis(cfg.retry_wait_min_ms),
            retry_wait_max: Duration::from_millis(cfg.retry_wait_max_ms),
            rate_limit_max_wait: Duration::from_millis(cfg.rate_limit_max_wait_ms),
        };
        policy.validate()?;
        Ok(policy)
    }
}
