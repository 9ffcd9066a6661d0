//! Periodic garbage collection of long-expired refresh tokens.

use std::sync::Arc;
use std::time::Duration;

use concierge_core::auth::session::SessionService;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Default interval between purges.
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 3600;

pub fn start_refresh_token_cleaner(
    sessions: Arc<SessionService>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(period);
        loop {
            interval_timer.tick().await;
            debug!("purging expired refresh tokens");
            match sessions.purge_expired_refresh_tokens().await {
                Ok(0) => {}
                Ok(purged) => info!(purged, "purged expired refresh tokens"),
                Err(err) => error!(error = %err, "failed to purge expired refresh tokens"),
            }
        }
    })
}
