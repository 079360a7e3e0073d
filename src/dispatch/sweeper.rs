use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::jobs::JobRegistry;

/// Run `cleanup(keep_last_n)` on the registry every `interval` until aborted
pub fn spawn_retention_sweep(
    registry: Arc<JobRegistry>,
    keep_last_n: usize,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(keep_last_n, interval_secs = interval.as_secs(), "Retention sweep started");

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let removed = registry.cleanup(keep_last_n).await;
            let remaining = registry.len().await;
            debug!(removed, remaining, "Retention sweep ran");
        }
    })
}
