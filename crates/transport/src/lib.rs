//! `pt-transport` — the request path every panel API call goes through.
//!
//! [`Transport`] decorates requests with the panel's auth/accept/user-agent
//! headers and runs them through a bounded retry loop:
//!
//! | Outcome              | Action                                           |
//! |----------------------|--------------------------------------------------|
//! | network error        | exponential back-off with jitter, retry          |
//! | `429`                | wait until `X-RateLimit-Reset` (clamped), retry  |
//! | `5xx`                | exponential back-off with jitter, retry          |
//! | anything else        | returned as-is                                   |
//!
//! 429s and 5xxs share one attempt budget. Every wait races the caller's
//! [`CancellationToken`](tokio_util::sync::CancellationToken).
//!
//! [`check_response`] sits one layer above and maps non-2xx responses to a
//! structured [`ApiError`](pt_domain::ApiError).

pub mod rate_limit;
pub mod response;
pub mod retry;
pub mod transport;

pub use rate_limit::parse_rate_limit;
pub use response::{check_response, from_reqwest};
pub use retry::RetryPolicy;
pub use transport::{Executor, Transport, API_VERSION};
