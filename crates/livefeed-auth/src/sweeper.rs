//! Periodic purge of expired refresh records and denylist entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::service::TokenService;

/// Spawns a background task that calls [`TokenService::sweep_expired`]
/// every `interval` until `cancel` fires.
pub fn spawn_sweeper(
    service: Arc<TokenService>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Token sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let stats = service.sweep_expired();
                    if stats.refresh_records > 0 || stats.denylist_entries > 0 {
                        info!(
                            refresh_records = stats.refresh_records,
                            denylist_entries = stats.denylist_entries,
                            "Token sweep completed"
                        );
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use livefeed_core::config::AuthConfig;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_cancel() {
        let service = Arc::new(TokenService::new(&AuthConfig::default()));
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(service, Duration::from_secs(60), cancel.clone());

        tokio::time::advance(Duration::from_secs(130)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should exit")
            .expect("sweeper should not panic");
    }
}
