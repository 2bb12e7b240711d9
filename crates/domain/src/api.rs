//! Wire-level error envelope and rate-limit snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Rate limit
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Rate-limit state reported by the panel on a single response.
///
/// The default value means the response carried no rate-limit headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RateLimitInfo {
    /// `X-RateLimit-Limit`: requests allowed per window.
    pub limit: u32,
    /// `X-RateLimit-Remaining`: requests left in the current window.
    pub remaining: u32,
    /// `X-RateLimit-Reset`: when the window resets.
    pub reset: Option<DateTime<Utc>>,
}

impl RateLimitInfo {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Points at the request field that caused an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    #[serde(default)]
    pub field: String,
}

/// A single entry of the panel's `{"errors": [...]}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
}

/// The body shape the panel uses for every non-2xx response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default)]
    pub errors: Vec<ErrorDetail>,
}

/// A non-2xx response from the panel, with whatever detail could be parsed.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub rate_limit: RateLimitInfo,
    pub errors: Vec<ErrorDetail>,
    pub method: String,
    pub url: String,
    /// Raw response body, kept for debugging when the envelope didn't parse.
    pub raw: String,
}

impl ApiError {
    /// Build an error from a status and raw body, parsing the envelope when
    /// the body is one.
    pub fn from_body(
        status: u16,
        method: impl Into<String>,
        url: impl Into<String>,
        rate_limit: RateLimitInfo,
        raw: String,
    ) -> Self {
        let errors = serde_json::from_str::<ErrorEnvelope>(&raw)
            .map(|env| env.errors)
            .unwrap_or_default();
        Self {
            status,
            rate_limit,
            errors,
            method: method.into(),
            url: url.into(),
            raw,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pterodactyl: ")?;
        if !self.method.is_empty() && !self.url.is_empty() {
            write!(f, "{} {}: ", self.method, self.url)?;
        }
        write!(f, "status {}", self.status)?;

        if !self.errors.is_empty() {
            let details: Vec<String> = self
                .errors
                .iter()
                .map(|e| match &e.source {
                    Some(src) if !src.field.is_empty() => {
                        format!("{} (field: {})", e.detail, src.field)
                    }
                    _ => e.detail.clone(),
                })
                .collect();
            write!(f, ": {}", details.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ApiError {}
