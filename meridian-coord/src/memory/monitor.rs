//! Background memory-pressure monitor.
//!
//! Periodically samples the accountant and opportunistically trims idle
//! components while pressure sits at `Medium` or above.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::time::interval;
use tracing::debug;

// Layer 3: Internal module imports
use super::manager::MemoryManager;
use super::pressure::MemoryPressure;

/// Spawn the background pressure monitor.
///
/// Every `check_interval` the task reads the pressure level and, at
/// `Medium` or above, runs an opportunistic trim
/// (`evict_idle_until(0)`).
///
/// Returns `(JoinHandle, oneshot::Sender)`; send `()` to stop the monitor
/// gracefully, or drop the handle owner and abort.
pub fn spawn_memory_monitor(
    manager: MemoryManager,
    check_interval: Duration,
) -> (
    tokio::task::JoinHandle<()>,
    tokio::sync::oneshot::Sender<()>,
) {
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel();

    let task_handle = tokio::spawn(async move {
        let mut ticker = interval(check_interval);
        // The first tick fires immediately; skip it so a freshly started
        // coordinator is not trimmed before anything initialized.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    let pressure = manager.pressure_level();
                    if pressure >= MemoryPressure::Medium {
                        let freed = manager.evict_idle_until(0).await;
                        debug!(%pressure, freed_bytes = freed, "memory monitor trim");
                    }
                }
            }
        }
    });

    (task_handle, shutdown_tx)
}
