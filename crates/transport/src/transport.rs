//! Header decoration + retry engine.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use pt_domain::error::{Error, Result};
use pt_domain::trace::TraceEvent;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Request, Response, StatusCode};
use tokio_util::sync::CancellationToken;

use crate::rate_limit::parse_rate_limit;
use crate::response::from_reqwest;
use crate::retry::RetryPolicy;

/// Panel API version advertised in the `Accept` header.
pub const API_VERSION: &str = "v1";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor seam
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Sends one HTTP request. The transport calls this once per attempt.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: Request) -> reqwest::Result<Response>;
}

#[async_trait]
impl Executor for reqwest::Client {
    async fn execute(&self, request: Request) -> reqwest::Result<Response> {
        reqwest::Client::execute(self, request).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Authenticating, retrying wrapper around an [`Executor`].
///
/// Cheap to clone; clones share the executor (and so its connection pool)
/// but nothing mutable.
#[derive(Clone)]
pub struct Transport {
    executor: Arc<dyn Executor>,
    headers: HeaderMap,
    policy: RetryPolicy,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Transport {
    pub fn new(
        executor: impl Executor + 'static,
        api_key: &str,
        user_agent: &str,
        policy: RetryPolicy,
    ) -> Result<Self> {
        policy.validate()?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|_| Error::Config("api key contains invalid header characters".into()))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_str(&format!("Application/vnd.pterodactyl.{API_VERSION}+json"))
                .map_err(|e| Error::Config(e.to_string()))?,
        );
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| Error::Config("user agent contains invalid characters".into()))?,
        );

        Ok(Self {
            executor: Arc::new(executor),
            headers,
            policy,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Overwrite the standard headers on a request. Safe to repeat.
    fn decorate(&self, request: &mut Request) {
        for (name, value) in &self.headers {
            request.headers_mut().insert(name.clone(), value.clone());
        }
    }

    /// Execute a request with retry + back-off.
    ///
    /// * Network errors and 5xx: exponential back-off with jitter.
    /// * 429: wait until the rate-limit window resets (clamped).
    /// * Other statuses, including 4xx: returned immediately.
    /// * When the attempt budget runs out the last response is returned
    ///   untouched, or the last network error is surfaced.
    ///
    /// The body is cloned for every attempt, so a streaming body that cannot
    /// be cloned is rejected with [`Error::BodyNotReplayable`] before
    /// anything is sent.
    pub async fn execute(
        &self,
        mut request: Request,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        self.decorate(&mut request);
        if request.try_clone().is_none() {
            return Err(Error::BodyNotReplayable);
        }

        let method = request.method().to_string();
        let path = request.url().path().to_owned();
        let max_attempts = self.policy.max_retries.max(1);

        let mut attempt: u32 = 0;
        loop {
            let last_attempt = attempt + 1 == max_attempts;
            let req = request.try_clone().ok_or(Error::BodyNotReplayable)?;

            let start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                r = self.executor.execute(req) => r,
            };
            let duration_ms = start.elapsed().as_millis() as u64;

            let resp = match result {
                Ok(resp) => resp,
                Err(e) => {
                    TraceEvent::HttpAttempt {
                        method: method.clone(),
                        path: path.clone(),
                        attempt,
                        status: 0,
                        duration_ms,
                    }
                    .emit();

                    if last_attempt {
                        return Err(from_reqwest(e));
                    }
                    let wait = self.policy.backoff(attempt);
                    tracing::warn!(
                        method = %method,
                        path = %path,
                        attempt,
                        error = %e,
                        wait_ms = wait.as_millis() as u64,
                        "request failed, retrying"
                    );
                    self.schedule(&method, &path, attempt, "network error", wait);
                    sleep_or_cancel(wait, cancel).await?;
                    attempt += 1;
                    continue;
                }
            };

            let status = resp.status();
            TraceEvent::HttpAttempt {
                method: method.clone(),
                path: path.clone(),
                attempt,
                status: status.as_u16(),
                duration_ms,
            }
            .emit();

            if !is_retryable(status) || last_attempt {
                return Ok(resp);
            }

            let wait = if status == StatusCode::TOO_MANY_REQUESTS {
                let rate_limit = parse_rate_limit(resp.headers());
                let wait = self.policy.rate_limit_wait(&rate_limit, Utc::now());
                TraceEvent::RateLimited {
                    path: path.clone(),
                    limit: rate_limit.limit,
                    remaining: rate_limit.remaining,
                    wait_ms: wait.as_millis() as u64,
                }
                .emit();
                wait
            } else {
                self.policy.backoff(attempt)
            };

            self.schedule(&method, &path, attempt, status.as_str(), wait);
            drain(resp, cancel).await?;
            sleep_or_cancel(wait, cancel).await?;
            attempt += 1;
        }
    }

    fn schedule(&self, method: &str, path: &str, attempt: u32, reason: &str, wait: Duration) {
        TraceEvent::RetryScheduled {
            method: method.to_owned(),
            path: path.to_owned(),
            attempt,
            reason: reason.to_owned(),
            wait_ms: wait.as_millis() as u64,
        }
        .emit();
    }
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() >= 500
}

/// Read and discard the body so the connection can go back to the pool.
async fn drain(resp: Response, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = resp.bytes() => Ok(()),
    }
}

async fn sleep_or_cancel(wait: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep(wait) => Ok(()),
    }
}
