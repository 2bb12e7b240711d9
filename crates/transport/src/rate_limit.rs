//! `X-RateLimit-*` header extraction.

use chrono::{TimeZone, Utc};
use pt_domain::RateLimitInfo;
use reqwest::header::HeaderMap;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// Extract the rate-limit snapshot from response headers.
///
/// Missing or unparseable headers leave their field at the zero value, so a
/// response without any of them yields `RateLimitInfo::default()`.
pub fn parse_rate_limit(headers: &HeaderMap) -> RateLimitInfo {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    RateLimitInfo {
        limit: get(HEADER_LIMIT)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        remaining: get(HEADER_REMAINING)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default(),
        reset: get(HEADER_RESET)
            .and_then(|v| v.parse::<i64>().ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
    }
}
