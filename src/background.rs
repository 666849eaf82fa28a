//! Periodic cleanup of abandoned temp files under the upload root.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::TEMP_SWEEP_INTERVAL_SECS;
use crate::storage::Storage;

/// A crashed or interrupted write can leave a staged temp file behind;
/// this sweeps them once they are older than `temp_ttl`.
pub fn spawn_background_tasks(storage: Arc<Storage>, temp_ttl: Duration) {
    if temp_ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            match storage.sweep_stale_temps(temp_ttl).await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "removed abandoned temp files"),
                Err(err) => warn!(error = %err, "temp file sweep failed"),
            }
        }
    });
}
