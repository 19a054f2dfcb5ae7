use std::time::Duration;

use tracing::info;

use mosaic_transfer::TransferRegistry;

/// Background task that evicts stalled transfers.
///
/// Runs on an interval and drops sessions that have not received a chunk
/// within the registry's idle timeout.
pub async fn run_eviction_loop(registry: TransferRegistry, interval: Duration) {
    let mut interval = tokio::time::interval(interval);

    loop {
        interval.tick().await;

        let evicted = registry.evict_idle().await;
        if !evicted.is_empty() {
            info!("Cleanup: evicted {} idle transfers", evicted.len());
        }
    }
}
