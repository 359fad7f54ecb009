//! Revocation ledger for logged-out sessions
//!
//! Sessions live entirely in encrypted cookies, so logout needs a small piece
//! of server-side state: the ids of revoked sessions, each kept at least until
//! the cookie that names it would have expired anyway.
//!
//! - [`ledger`] - redb-backed store fronted by a bloom filter
//! - [`bloom`] - the lock-free bloom filter
//! - [`cleanup`] - periodic compaction task

pub mod bloom;
pub mod cleanup;
pub mod ledger;

pub use bloom::BloomFilter;
pub use cleanup::{spawn_cleanup_task, DEFAULT_CLEANUP_INTERVAL_SECS};
pub use ledger::{FilterSizing, RevocationLedger};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RevocationError {
    #[error("revocation storage error: {0}")]
    Storage(#[from] redb::Error),
    #[error("revocation store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("revocation store is closed")]
    Closed,
    #[error("revocation store did not answer within {0:?}")]
    Timeout(std::time::Duration),
    #[error("revocation worker failed: {0}")]
    Worker(String),
}

/// Durable, expiring set of revoked session ids
#[async_trait]
pub trait RevocationStore: Send + Sync {
    /// Revoke `session_id` for at least `ttl_seconds`. Durable once this returns.
    async fn invalidate(&self, session_id: &str, ttl_seconds: u64) -> Result<(), RevocationError>;

    /// Whether `session_id` has a live revocation entry
    async fn is_invalidated(&self, session_id: &str) -> Result<bool, RevocationError>;

    /// Purge expired entries and rebuild the fast-path filter; returns the number purged
    async fn cleanup(&self) -> Result<usize, RevocationError>;

    /// Release the backing storage. Later calls fail with [`RevocationError::Closed`].
    async fn close(&self) -> Result<(), RevocationError>;
}
