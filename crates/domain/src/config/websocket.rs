use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Console websocket reconnection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketConfig {
    #[serde(default = "d_true")]
    pub reconnect: bool,
    /// `0` means retry forever.
    #[serde(default = "d_10")]
    pub max_attempts: u32,
    #[serde(default = "d_1000")]
    pub initial_delay_ms: u64,
    #[serde(default = "d_30000")]
    pub max_delay_ms: u64,
    #[serde(default = "d_2")]
    pub multiplier: f64,
    /// Capacity of the event channel handed to consumers.
    #[serde(default = "d_100")]
    pub event_buffer: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            reconnect: true,
            max_attempts: 10,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            event_buffer: 100,
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_10() -> u32 {
    10
}
fn d_1000() -> u64 {
    1000
}
fn d_30000() -> u64 {
    30_000
}
fn d_2() -> f64 {
    2.0
}
fn d_100() -> usize {
    100
}
