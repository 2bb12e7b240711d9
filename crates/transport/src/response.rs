//! Response checking: non-2xx → structured [`ApiError`].

use pt_domain::error::{Error, Result};
use pt_domain::ApiError;
use reqwest::{Method, Response};

use crate::rate_limit::parse_rate_limit;

/// Pass 2xx responses through; turn anything else into [`Error::Api`],
/// parsing the panel's error envelope from the body when possible.
pub async fn check_response(method: &Method, resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status().as_u16();
    let rate_limit = parse_rate_limit(resp.headers());
    let url = resp.url().to_string();
    let raw = match resp.text().await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::debug!(status, error = %e, "failed to read error response body");
            String::new()
        }
    };

    let err = ApiError::from_body(status, method.as_str(), url, rate_limit, raw);
    tracing::debug!(status, error = %err, "panel returned an error response");
    Err(err.into())
}

/// Convert a `reqwest::Error` into a domain `Error`.
///
/// Timeout errors become `Error::Timeout`; everything else becomes
/// `Error::Http`.
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}
