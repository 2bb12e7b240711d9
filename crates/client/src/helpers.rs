//! Convenience routines built on the sub-clients.

use std::time::Duration;

use pt_domain::error::{Error, Result};
use tokio_util::sync::CancellationToken;

use crate::client_api::ClientApi;

/// Poll `server_resources` until the server reports `desired_state`.
///
/// The first poll happens after one `poll_interval`. Polling errors are
/// returned immediately. Bound the wait with `cancel`; cancellation yields
/// [`Error::Cancelled`].
pub async fn wait_for_state(
    api: &ClientApi,
    server_id: &str,
    desired_state: &str,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    if poll_interval.is_zero() {
        return Err(Error::InvalidArgument("poll interval must be positive".into()));
    }

    let first_tick = tokio::time::Instant::now() + poll_interval;
    let mut ticker = tokio::time::interval_at(first_tick, poll_interval);
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = ticker.tick() => {}
        }

        let stats = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = api.server_resources(server_id) => r?,
        };
        tracing::debug!(
            server_id,
            state = %stats.current_state,
            desired_state,
            "polled server state"
        );
        if stats.current_state == desired_state {
            return Ok(());
        }
    }
}
