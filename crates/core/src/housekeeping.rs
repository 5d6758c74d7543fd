//! Housekeeping (C11): a background sweep that evicts stale dedup-cache
//! and in-progress entries so both tables stay bounded over a
//! long-running process.

use crate::task::TaskEngine;
use crate::types::CLEANUP_INTERVAL_SECS;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Runs the housekeeping loop until `cancel` fires. Exceptions evicting
/// one table never stop the other, and the loop always continues:
/// housekeeping failures are logged, not fatal.
pub async fn run(engine: Arc<TaskEngine>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
    // The first tick fires immediately; skip it so the very first sweep
    // happens a full interval after startup, not at t=0.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("housekeeping stopped");
                return;
            }
            _ = ticker.tick() => {
                sweep(&engine);
            }
        }
    }
}

fn sweep(engine: &TaskEngine) {
    let evicted = engine.dedup_cache().evict_stale();
    info!(evicted, remaining = engine.dedup_cache().len(), "dedup cache sweep complete");

    let evicted = engine.in_progress().evict_stale();
    info!(evicted, remaining = engine.in_progress().len(), "in-progress table sweep complete");
}
