use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use log::{debug, info};
use redb::{backends::InMemoryBackend, Database, ReadableTable, TableDefinition};

use super::{BloomFilter, RevocationError, RevocationStore};
use crate::clock::Clock;

/// Session id -> expiry (epoch seconds)
const REVOKED_SESSIONS: TableDefinition<&str, i64> = TableDefinition::new("revoked_sessions");

/// Bloom filter sizing. Each rebuild allows `expected_insertions` new ids on top of the survivors.
#[derive(Debug, Clone, Copy)]
pub struct FilterSizing {
    pub expected_insertions: usize,
    pub false_positive_rate: f64,
}

impl Default for FilterSizing {
    fn default() -> Self {
        Self {
            expected_insertions: 100_000,
            false_positive_rate: 0.001,
        }
    }
}

/// redb-backed [`RevocationStore`] with a bloom filter in front of every lookup
///
/// Blocking storage work runs on tokio's blocking pool. The filter is
/// replaced wholesale after each compaction; ids revoked while a rebuild is in
/// flight are journaled and replayed into the new filter before the swap, so
/// the fast path never reports a committed revocation as absent.
#[derive(Clone)]
pub struct RevocationLedger {
    inner: Arc<Inner>,
}

struct Inner {
    db: RwLock<Option<Database>>,
    closed: AtomicBool,
    filter: FilterSlot,
    clock: Arc<dyn Clock>,
    sizing: FilterSizing,
    compaction: Mutex<()>,
}

struct FilterSlot {
    current: RwLock<Arc<BloomFilter>>,
    journal: Mutex<Option<Vec<String>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn storage(error: impl Into<redb::Error>) -> RevocationError {
    RevocationError::Storage(error.into())
}

impl FilterSlot {
    fn new(filter: BloomFilter) -> Self {
        Self {
            current: RwLock::new(Arc::new(filter)),
            journal: Mutex::new(None),
        }
    }

    fn current(&self) -> Arc<BloomFilter> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn might_contain(&self, id: &str) -> bool {
        self.current().might_contain(id)
    }

    fn insert(&self, id: &str) {
        let mut journal = lock(&self.journal);
        if let Some(pending) = journal.as_mut() {
            pending.push(id.to_owned());
        }
        self.current().insert(id);
    }

    fn begin_rebuild(&self) {
        *lock(&self.journal) = Some(Vec::new());
    }

    fn complete_rebuild(&self, rebuilt: BloomFilter) {
        let mut journal = lock(&self.journal);
        for id in journal.take().unwrap_or_default() {
            rebuilt.insert(&id);
        }
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rebuilt);
    }

    fn abort_rebuild(&self) {
        *lock(&self.journal) = None;
    }
}

impl RevocationLedger {
    /// Open (or create) the ledger file at `path` and compact it once
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the initial cleanup fails
    pub fn open(
        path: impl AsRef<Path>,
        clock: Arc<dyn Clock>,
        sizing: FilterSizing,
    ) -> Result<Self, RevocationError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(storage)?;
        let ledger = Self::from_database(db, clock, sizing)?;
        info!("🗂️ Revocation ledger opened at {}", path.display());
        Ok(ledger)
    }

    /// A ledger that lives only as long as the process
    ///
    /// # Errors
    ///
    /// Returns an error if the in-memory database cannot be initialised
    pub fn in_memory(clock: Arc<dyn Clock>, sizing: FilterSizing) -> Result<Self, RevocationError> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(storage)?;
        Self::from_database(db, clock, sizing)
    }

    fn from_database(
        db: Database,
        clock: Arc<dyn Clock>,
        sizing: FilterSizing,
    ) -> Result<Self, RevocationError> {
        let txn = db.begin_write().map_err(storage)?;
        txn.open_table(REVOKED_SESSIONS).map_err(storage)?;
        txn.commit().map_err(storage)?;

        let inner = Inner {
            db: RwLock::new(Some(db)),
            closed: AtomicBool::new(false),
            filter: FilterSlot::new(BloomFilter::with_capacity(
                sizing.expected_insertions,
                sizing.false_positive_rate,
            )),
            clock,
            sizing,
            compaction: Mutex::new(()),
        };
        inner.cleanup()?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Remove every entry and reset the filter
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the write fails
    pub async fn delete_all(&self) -> Result<usize, RevocationError> {
        self.run_blocking(Inner::delete_all).await
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, RevocationError>
    where
        T: Send + 'static,
        F: FnOnce(&Inner) -> Result<T, RevocationError> + Send + 'static,
    {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RevocationError::Closed);
        }
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || work(&inner))
            .await
            .map_err(|e| RevocationError::Worker(e.to_string()))?
    }
}

impl Inner {
    fn with_db<T>(
        &self,
        work: impl FnOnce(&Database) -> Result<T, RevocationError>,
    ) -> Result<T, RevocationError> {
        let guard = self.db.read().unwrap_or_else(PoisonError::into_inner);
        let db = guard.as_ref().ok_or(RevocationError::Closed)?;
        work(db)
    }

    fn invalidate(&self, id: &str, ttl_seconds: u64) -> Result<(), RevocationError> {
        let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = self.clock.now().saturating_add(ttl);

        self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            {
                let mut table = txn.open_table(REVOKED_SESSIONS).map_err(storage)?;
                let existing = table.get(id).map_err(storage)?.map(|v| v.value());
                let expiry = existing.map_or(expires_at, |e| e.max(expires_at));
                table.insert(id, expiry).map_err(storage)?;
            }
            txn.commit().map_err(storage)
        })?;

        self.filter.insert(id);
        debug!("Session {id} revoked until {expires_at}");
        Ok(())
    }

    fn lookup(&self, id: &str) -> Result<bool, RevocationError> {
        let now = self.clock.now();
        self.with_db(|db| {
            let txn = db.begin_read().map_err(storage)?;
            let table = txn.open_table(REVOKED_SESSIONS).map_err(storage)?;
            let expiry = table.get(id).map_err(storage)?.map(|v| v.value());
            Ok(expiry.is_some_and(|expiry| expiry >= now))
        })
    }

    fn cleanup(&self) -> Result<usize, RevocationError> {
        let _compaction = lock(&self.compaction);
        self.filter.begin_rebuild();

        match self.compact() {
            Ok((survivors, purged)) => {
                let rebuilt = BloomFilter::with_capacity(
                    survivors.len() + self.sizing.expected_insertions,
                    self.sizing.false_positive_rate,
                );
                for id in &survivors {
                    rebuilt.insert(id);
                }
                self.filter.complete_rebuild(rebuilt);
                debug!(
                    "Revocation cleanup purged {purged} entries, {} remain",
                    survivors.len()
                );
                Ok(purged)
            }
            Err(e) => {
                self.filter.abort_rebuild();
                Err(e)
            }
        }
    }

    /// Delete expired entries; returns surviving ids and the purge count
    fn compact(&self) -> Result<(Vec<String>, usize), RevocationError> {
        let now = self.clock.now();
        self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            let mut survivors = Vec::new();
            let mut expired = Vec::new();
            {
                let mut table = txn.open_table(REVOKED_SESSIONS).map_err(storage)?;
                for entry in table.iter().map_err(storage)? {
                    let (id, expiry) = entry.map_err(storage)?;
                    if expiry.value() < now {
                        expired.push(id.value().to_owned());
                    } else {
                        survivors.push(id.value().to_owned());
                    }
                }
                for id in &expired {
                    table.remove(id.as_str()).map_err(storage)?;
                }
            }
            txn.commit().map_err(storage)?;
            Ok((survivors, expired.len()))
        })
    }

    fn delete_all(&self) -> Result<usize, RevocationError> {
        let _compaction = lock(&self.compaction);
        self.filter.begin_rebuild();

        match self.clear() {
            Ok(removed) => {
                self.filter.complete_rebuild(BloomFilter::with_capacity(
                    self.sizing.expected_insertions,
                    self.sizing.false_positive_rate,
                ));
                info!("Revocation ledger cleared ({removed} entries)");
                Ok(removed)
            }
            Err(e) => {
                self.filter.abort_rebuild();
                Err(e)
            }
        }
    }

    /// Delete every entry; returns the number removed
    fn clear(&self) -> Result<usize, RevocationError> {
        self.with_db(|db| {
            let txn = db.begin_write().map_err(storage)?;
            let removed;
            {
                let mut table = txn.open_table(REVOKED_SESSIONS).map_err(storage)?;
                let mut ids = Vec::new();
                for entry in table.iter().map_err(storage)? {
                    let (id, _) = entry.map_err(storage)?;
                    ids.push(id.value().to_owned());
                }
                for id in &ids {
                    table.remove(id.as_str()).map_err(storage)?;
                }
                removed = ids.len();
            }
            txn.commit().map_err(storage)?;
            Ok(removed)
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let db = self
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if db.is_some() {
            info!("Revocation ledger closed");
        }
    }
}

#[async_trait]
impl RevocationStore for RevocationLedger {
    async fn invalidate(&self, session_id: &str, ttl_seconds: u64) -> Result<(), RevocationError> {
        let id = session_id.to_owned();
        self.run_blocking(move |inner| inner.invalidate(&id, ttl_seconds))
            .await
    }

    async fn is_invalidated(&self, session_id: &str) -> Result<bool, RevocationError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(RevocationError::Closed);
        }
        if !self.inner.filter.might_contain(session_id) {
            return Ok(false);
        }
        let id = session_id.to_owned();
        self.run_blocking(move |inner| inner.lookup(&id)).await
    }

    async fn cleanup(&self) -> Result<usize, RevocationError> {
        self.run_blocking(Inner::cleanup).await
    }

    async fn close(&self) -> Result<(), RevocationError> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.close())
            .await
            .map_err(|e| RevocationError::Worker(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn ledger(clock: &Arc<ManualClock>) -> RevocationLedger {
        RevocationLedger::in_memory(clock.clone(), FilterSizing::default()).unwrap()
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_invalidated() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);
        assert!(!store.is_invalidated("never-seen").await.unwrap());
    }

    #[tokio::test]
    async fn test_revocation_lower_bound() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);

        store.invalidate("abc", 100).await.unwrap();
        assert!(store.is_invalidated("abc").await.unwrap());

        clock.advance(99);
        store.cleanup().await.unwrap();
        assert!(store.is_invalidated("abc").await.unwrap());

        clock.advance(2);
        assert_eq!(store.cleanup().await.unwrap(), 1);
        assert!(!store.is_invalidated("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_reinvalidation_keeps_later_expiry() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);

        store.invalidate("abc", 500).await.unwrap();
        store.invalidate("abc", 10).await.unwrap();

        clock.advance(100);
        store.cleanup().await.unwrap();
        assert!(store.is_invalidated("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entry_is_not_live_before_cleanup() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);

        store.invalidate("abc", 10).await.unwrap();
        clock.advance(11);
        assert!(!store.is_invalidated("abc").await.unwrap());
    }

    #[tokio::test]
    async fn test_filter_covers_every_revoked_id() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);

        for i in 0..200 {
            store.invalidate(&format!("id-{i}"), 3_600).await.unwrap();
        }
        store.cleanup().await.unwrap();

        let filter = store.inner.filter.current();
        assert!((0..200).all(|i| filter.might_contain(&format!("id-{i}"))));
    }

    #[test]
    fn test_rebuild_journal_replays_concurrent_revocations() {
        let slot = FilterSlot::new(BloomFilter::with_capacity(100, 0.001));
        slot.begin_rebuild();
        slot.insert("revoked-during-rebuild");
        slot.complete_rebuild(BloomFilter::with_capacity(100, 0.001));

        assert!(slot.might_contain("revoked-during-rebuild"));
        assert!(lock(&slot.journal).is_none());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);

        store.invalidate("a", 100).await.unwrap();
        store.invalidate("b", 100).await.unwrap();
        assert_eq!(store.delete_all().await.unwrap(), 2);
        assert!(!store.is_invalidated("a").await.unwrap());
        assert!(!store.is_invalidated("b").await.unwrap());
    }

    #[test]
    fn test_revocations_racing_delete_all_stay_in_filter() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);
        let inner = &store.inner;

        std::thread::scope(|scope| {
            for worker in 0..4 {
                scope.spawn(move || {
                    for i in 0..100 {
                        inner.invalidate(&format!("w{worker}-{i}"), 3_600).unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..25 {
                    inner.delete_all().unwrap();
                }
            });
        });

        for worker in 0..4 {
            for i in 0..100 {
                let id = format!("w{worker}-{i}");
                if inner.lookup(&id).unwrap() {
                    assert!(
                        inner.filter.might_contain(&id),
                        "{id} is stored but missing from the filter"
                    );
                }
            }
        }
    }

    #[tokio::test]
    async fn test_closed_store_rejects_calls() {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = ledger(&clock);
        store.close().await.unwrap();

        assert!(matches!(
            store.is_invalidated("a").await,
            Err(RevocationError::Closed)
        ));
        assert!(matches!(
            store.invalidate("a", 10).await,
            Err(RevocationError::Closed)
        ));
    }
}
