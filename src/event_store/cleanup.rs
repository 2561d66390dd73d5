//! Background retention cleanup.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::SharedEventStore;

/// Pause before retrying after an unexpected cleanup failure.
const ERROR_RETRY_SECS: u64 = 60;

/// Spawn the periodic cleanup task.
///
/// Each iteration deletes entries older than the retention window and
/// reclaims file space. The task exits cleanly when `token` is cancelled;
/// on error it waits 60 s before the next attempt.
pub fn spawn_cleanup_task(
    store: SharedEventStore,
    interval: Duration,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "Event store cleanup task started (interval {}h)",
            interval.as_secs() / 3600
        );
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    info!("Event store cleanup task stopping");
                    break;
                }
                _ = tokio::time::sleep(interval) => {
                    match store.cleanup_expired().await {
                        Ok(0) => {}
                        Ok(count) => info!("Cleanup removed {} expired events", count),
                        Err(e) => {
                            error!("Event store cleanup failed: {}", e);
                            tokio::select! {
                                _ = token.cancelled() => break,
                                _ = tokio::time::sleep(Duration::from_secs(ERROR_RETRY_SECS)) => {}
                            }
                        }
                    }
                }
            }
        }
    })
}
