// Persistent revocation ledger behaviour across restarts
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tollgate::clock::{Clock, ManualClock};
use tollgate::revocation::{
    spawn_cleanup_task, FilterSizing, RevocationError, RevocationLedger, RevocationStore,
};
use tollgate::testing::constants::TEST_NOW;

fn open(dir: &TempDir, clock: Arc<dyn Clock>) -> RevocationLedger {
    RevocationLedger::open(
        dir.path().join("revocation").join("ledger.redb"),
        clock,
        FilterSizing::default(),
    )
    .expect("ledger should open")
}

#[tokio::test]
async fn test_revocations_survive_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(TEST_NOW));

    let ledger = open(&dir, clock.clone());
    ledger.invalidate("session-a", 3600).await.unwrap();
    ledger.invalidate("session-b", 10).await.unwrap();
    ledger.close().await.unwrap();

    assert!(matches!(
        ledger.is_invalidated("session-a").await,
        Err(RevocationError::Closed)
    ));

    clock.advance(60);
    let reopened = open(&dir, clock.clone());
    assert!(reopened.is_invalidated("session-a").await.unwrap());
    assert!(
        !reopened.is_invalidated("session-b").await.unwrap(),
        "expired entries are compacted when the ledger opens"
    );
    assert!(!reopened.is_invalidated("never-revoked").await.unwrap());
    reopened.close().await.unwrap();
}

#[tokio::test]
async fn test_reinvalidating_keeps_the_later_expiry() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(TEST_NOW));
    let ledger = open(&dir, clock.clone());

    ledger.invalidate("session-a", 600).await.unwrap();
    ledger.invalidate("session-a", 30).await.unwrap();

    clock.advance(300);
    assert!(ledger.is_invalidated("session-a").await.unwrap());
    assert_eq!(ledger.cleanup().await.unwrap(), 0);

    clock.advance(301);
    assert_eq!(ledger.cleanup().await.unwrap(), 1);
    assert!(!ledger.is_invalidated("session-a").await.unwrap());
}

#[tokio::test]
async fn test_delete_all_clears_the_ledger() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(TEST_NOW));
    let ledger = open(&dir, clock);

    for id in ["one", "two", "three"] {
        ledger.invalidate(id, 3600).await.unwrap();
    }
    assert_eq!(ledger.delete_all().await.unwrap(), 3);
    for id in ["one", "two", "three"] {
        assert!(!ledger.is_invalidated(id).await.unwrap());
    }
}

#[tokio::test]
async fn test_cleanup_task_stops_when_store_closes() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(TEST_NOW));
    let ledger = open(&dir, clock);
    let store: Arc<dyn RevocationStore> = Arc::new(ledger.clone());

    let handle = spawn_cleanup_task(store, Duration::from_millis(10));
    ledger.close().await.unwrap();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("cleanup task should stop after close")
        .unwrap();
}
