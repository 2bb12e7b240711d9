use serde::Serialize;

/// Structured trace events emitted across the panel client crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    HttpAttempt {
        method: String,
        path: String,
        attempt: u32,
        status: u16,
        duration_ms: u64,
    },
    RetryScheduled {
        method: String,
        path: String,
        attempt: u32,
        reason: String,
        wait_ms: u64,
    },
    RateLimited {
        path: String,
        limit: u32,
        remaining: u32,
        wait_ms: u64,
    },
    PageFetched {
        path: String,
        page: u32,
        total_pages: u32,
        items: usize,
    },
    StreamReconnecting {
        socket_url: String,
        attempt: u32,
        delay_ms: u64,
    },
    StreamReconnected {
        socket_url: String,
        attempts: u32,
    },
    StreamClosed {
        socket_url: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pt_event");
    }
}
