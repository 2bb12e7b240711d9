mod retry;
mod websocket;

pub use retry::*;
pub use websocket::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Panel root, e.g. `https://panel.example.com`. `/api/` is appended.
    #[serde(default)]
    pub panel_url: String,
    /// Plaintext API key (`ptla_…` application, `ptlc_…` client).
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_user_agent")]
    pub user_agent: String,
    /// Per-attempt HTTP timeout.
    #[serde(default = "d_30000")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            panel_url: String::new(),
            api_key: None,
            api_key_env: d_api_key_env(),
            user_agent: d_user_agent(),
            timeout_ms: 30_000,
            retry: RetryConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

fn d_api_key_env() -> String {
    "PTERODACTYL_API_KEY".into()
}
fn d_user_agent() -> String {
    concat!("pterodactyl-rs/", env!("CARGO_PKG_VERSION")).into()
}
fn d_30000() -> u64 {
    30_000
}

impl ClientConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the API key: the plaintext field wins, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(ref key) = self.api_key {
            return Ok(key.clone());
        }
        std::env::var(&self.api_key_env).map_err(|_| {
            Error::Config(format!(
                "no api_key configured and environment variable '{}' is not set",
                self.api_key_env
            ))
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ClientConfig {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut push = |severity, field: &str, message: String| {
            errors.push(ConfigError {
                severity,
                field: field.into(),
                message,
            })
        };

        if self.panel_url.is_empty() {
            push(
                ConfigSeverity::Error,
                "panel_url",
                "panel_url must not be empty".into(),
            );
        } else if !(self.panel_url.starts_with("http://")
            || self.panel_url.starts_with("https://"))
        {
            push(
                ConfigSeverity::Error,
                "panel_url",
                "panel_url must start with http:// or https://".into(),
            );
        }

        match self.api_key.as_deref() {
            None => push(
                ConfigSeverity::Warning,
                "api_key",
                format!("no api_key set; will read ${} at startup", self.api_key_env),
            ),
            Some(key) if !(key.starts_with("ptla_") || key.starts_with("ptlc_")) => push(
                ConfigSeverity::Warning,
                "api_key",
                "api_key has neither the ptla_ nor the ptlc_ prefix".into(),
            ),
            Some(_) => {}
        }

        if self.timeout_ms == 0 {
            push(
                ConfigSeverity::Error,
                "timeout_ms",
                "timeout_ms must be greater than 0".into(),
            );
        }

        // Retry policy.
        let r = &self.retry;
        if r.max_retries == 0 {
            push(
                ConfigSeverity::Error,
                "retry.max_retries",
                "max_retries must be at least 1".into(),
            );
        }
        if r.retry_wait_min_ms == 0 {
            push(
                ConfigSeverity::Error,
                "retry.retry_wait_min_ms",
                "retry_wait_min_ms must be greater than 0".into(),
            );
        }
        if r.retry_wait_max_ms < r.retry_wait_min_ms {
            push(
                ConfigSeverity::Error,
                "retry.retry_wait_max_ms",
                format!(
                    "retry_wait_max_ms ({}) must be >= retry_wait_min_ms ({})",
                    r.retry_wait_max_ms, r.retry_wait_min_ms
                ),
            );
        }
        if r.rate_limit_max_wait_ms == 0 {
            push(
                ConfigSeverity::Error,
                "retry.rate_limit_max_wait_ms",
                "rate_limit_max_wait_ms must be greater than 0".into(),
            );
        }

        // Websocket reconnection.
        let w = &self.websocket;
        if w.multiplier < 1.0 || !w.multiplier.is_finite() {
            push(
                ConfigSeverity::Error,
                "websocket.multiplier",
                format!("multiplier must be a finite number >= 1.0, got {}", w.multiplier),
            );
        }
        if w.reconnect && w.initial_delay_ms == 0 {
            push(
                ConfigSeverity::Error,
                "websocket.initial_delay_ms",
                "initial_delay_ms must be greater than 0".into(),
            );
        }
        if w.max_delay_ms < w.initial_delay_ms {
            push(
                ConfigSeverity::Error,
                "websocket.max_delay_ms",
                "max_delay_ms must be >= initial_delay_ms".into(),
            );
        }
        if w.event_buffer == 0 {
            push(
                ConfigSeverity::Error,
                "websocket.event_buffer",
                "event_buffer must be at least 1".into(),
            );
        }
        if w.reconnect && w.max_attempts == 0 {
            push(
                ConfigSeverity::Warning,
                "websocket.max_attempts",
                "max_attempts = 0 reconnects forever against an unreachable panel".into(),
            );
        }

        errors
    }

    /// Like [`validate`](Self::validate) but fails on the first
    /// error-severity issue. Warnings are logged.
    pub fn ensure_valid(&self) -> Result<()> {
        let issues = self.validate();
        for issue in issues.iter().filter(|i| i.severity == ConfigSeverity::Warning) {
            tracing::warn!(field = %issue.field, "{}", issue.message);
        }
        match issues
            .into_iter()
            .find(|i| i.severity == ConfigSeverity::Error)
        {
            Some(err) => Err(Error::Config(err.to_string())),
            None => Ok(()),
        }
    }
}
