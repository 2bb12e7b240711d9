use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP retry / rate-limit behavior
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per request, 429s and 5xxs included.
    #[serde(default = "d_3")]
    pub max_retries: u32,
    #[serde(default = "d_1000")]
    pub retry_wait_min_ms: u64,
    #[serde(default = "d_5000")]
    pub retry_wait_max_ms: u64,
    /// Upper bound on how long a 429 may park a request.
    #[serde(default = "d_300000")]
    pub rate_limit_max_wait_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_wait_min_ms: 1000,
            retry_wait_max_ms: 5000,
            rate_limit_max_wait_ms: 300_000,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_3() -> u32 {
    3
}
fn d_1000() -> u64 {
    1000
}
fn d_5000() -> u64 {
    5000
}
fn d_300000() -> u64 {
    300_000
}
