//! Reconnect policy with jittered exponential back-off.

use std::time::Duration;

use pt_domain::config::WebSocketConfig;
use rand::Rng;

/// Jitter added on top of each delay, as a fraction of that delay.
const MAX_JITTER: f64 = 0.1;

/// Controls how a console connection reconnects after the stream drops.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    /// Maximum number of consecutive failed attempts before giving up.
    /// `0` means unlimited retries.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt.
    pub initial_delay: Duration,
    /// Maximum delay between attempts (cap).
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub multiplier: f64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&WebSocketConfig> for ReconnectPolicy {
    fn from(cfg: &WebSocketConfig) -> Self {
        Self {
            enabled: cfg.reconnect,
            max_attempts: cfg.max_attempts,
            initial_delay: Duration::from_millis(cfg.initial_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            multiplier: cfg.multiplier,
        }
    }
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Un-jittered delay before the given attempt (0-indexed):
    /// `initial_delay * multiplier^attempt`, capped at `max_delay`.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(i32::MAX as u32) as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * factor;
        let cap_secs = self.max_delay.max(self.initial_delay).as_secs_f64();
        Duration::from_secs_f64(delay_secs.min(cap_secs))
    }

    /// Delay before the given attempt plus up to 10% random jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        let jitter = rand::rng().random_range(0.0..MAX_JITTER);
        base + base.mul_f64(jitter)
    }

    /// Whether `attempt` failed attempts exhaust the budget.
    pub fn should_give_up(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}
