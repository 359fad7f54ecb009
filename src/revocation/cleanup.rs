use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{RevocationError, RevocationStore};

pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;

/// Run `cleanup()` on `store` every `interval` until the store is closed or the task is aborted
#[must_use]
pub fn spawn_cleanup_task(store: Arc<dyn RevocationStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; stores compact when opened.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.cleanup().await {
                Ok(purged) => debug!("Scheduled revocation cleanup purged {purged} entries"),
                Err(RevocationError::Closed) => {
                    info!("Revocation store closed, stopping cleanup task");
                    break;
                }
                Err(e) => error!("Scheduled revocation cleanup failed: {e}"),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::revocation::{FilterSizing, RevocationLedger};

    #[tokio::test]
    async fn test_cleanup_task_purges_expired_entries() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = RevocationLedger::in_memory(clock.clone(), FilterSizing::default()).unwrap();
        ledger.invalidate("short-lived", 5).await.unwrap();

        let store: Arc<dyn RevocationStore> = Arc::new(ledger.clone());
        let handle = spawn_cleanup_task(store, Duration::from_millis(20));

        clock.advance(10);
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(ledger.delete_all().await.unwrap(), 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_when_store_closes() {
        let clock = Arc::new(ManualClock::new(1_000));
        let ledger = RevocationLedger::in_memory(clock, FilterSizing::default()).unwrap();
        let store: Arc<dyn RevocationStore> = Arc::new(ledger);

        let handle = spawn_cleanup_task(store.clone(), Duration::from_millis(10));
        store.close().await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("cleanup task should stop after close")
            .unwrap();
    }
}
