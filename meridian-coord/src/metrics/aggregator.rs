//! Background system-wide metrics aggregation.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::time::interval;
use tracing::debug;

// Layer 3: Internal module imports
use super::collector::MetricsCollector;

/// Spawn the periodic aggregation task.
///
/// Every `aggregation_interval` the task sums per-component gauges into the
/// system-wide aggregate and forwards it through the collector's backend.
///
/// Returns `(JoinHandle, oneshot::Sender)`; send `()` to stop gracefully.
pub fn spawn_metrics_aggregator(
    collector: MetricsCollector,
    aggregation_interval: Duration,
) -> (
    tokio::task::JoinHandle<()>,
    tokio::sync::oneshot::Sender<()>,
) {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

    let task_handle = tokio::spawn(async move {
        let mut ticker = interval(aggregation_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let aggregate = collector.aggregate();
                    debug!(
                        total_memory = aggregate.total_memory_usage,
                        components = aggregate.component_count,
                        "metrics aggregation tick"
                    );
                }
            }
        }
    });

    (task_handle, shutdown_tx)
}
