//! Fixed-interval keepalive and stale-connection eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::registry::ConnectionRegistry;

/// Outcome of one heartbeat sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatSweep {
    /// Connections terminated as stale or disconnected.
    pub evicted: usize,
    /// Connections that were sent a keepalive frame.
    pub pinged: usize,
}

/// Run the heartbeat loop until `cancel` fires.
///
/// Each tick terminates connections idle past the stale threshold and sends
/// a keepalive to every other connection. `on_tick` runs after each sweep.
pub async fn run_heartbeat<F>(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    cancel: CancellationToken,
    mut on_tick: F,
) where
    F: FnMut(HeartbeatSweep) + Send,
{
    let mut ticker = time::interval(interval);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let sweep = registry.sweep();
                if sweep.evicted > 0 {
                    info!(evicted = sweep.evicted, pinged = sweep.pinged, "Heartbeat sweep evicted connections");
                }
                on_tick(sweep);
            }
        }
    }

    debug!("Heartbeat loop ended");
}
