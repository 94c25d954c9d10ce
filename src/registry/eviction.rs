//! Background sweep that drops idle finished jobs

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::store::JobRegistry;
use crate::observability::Metrics;

/// Spawn the sweeper; it runs every `interval` until `shutdown` fires
pub fn spawn_sweeper(
    registry: Arc<JobRegistry>,
    metrics: Arc<Metrics>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?ttl, ?interval, "Job eviction sweeper started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let evicted = registry.evict_idle(ttl);
                    debug!(count = evicted.len(), remaining = registry.len(), "Eviction sweep finished");
                    metrics.jobs_evicted(evicted.len());
                }
            }
        }

        info!("Job eviction sweeper stopped");
    })
}
