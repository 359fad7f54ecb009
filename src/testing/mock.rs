//! Revocation stores that misbehave on purpose

use std::time::Duration;

use async_trait::async_trait;

use crate::revocation::{RevocationError, RevocationStore};

fn unavailable() -> RevocationError {
    RevocationError::Io(std::io::Error::other("revocation backend unavailable"))
}

/// Every call fails with an I/O error
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRevocationStore;

#[async_trait]
impl RevocationStore for FailingRevocationStore {
    async fn invalidate(
        &self,
        _session_id: &str,
        _ttl_seconds: u64,
    ) -> Result<(), RevocationError> {
        Err(unavailable())
    }

    async fn is_invalidated(&self, _session_id: &str) -> Result<bool, RevocationError> {
        Err(unavailable())
    }

    async fn cleanup(&self) -> Result<usize, RevocationError> {
        Err(unavailable())
    }

    async fn close(&self) -> Result<(), RevocationError> {
        Ok(())
    }
}

/// Answers "not revoked" only after `delay`
#[derive(Debug, Clone, Copy)]
pub struct SlowRevocationStore {
    pub delay: Duration,
}

#[async_trait]
impl RevocationStore for SlowRevocationStore {
    async fn invalidate(
        &self,
        _session_id: &str,
        _ttl_seconds: u64,
    ) -> Result<(), RevocationError> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn is_invalidated(&self, _session_id: &str) -> Result<bool, RevocationError> {
        tokio::time::sleep(self.delay).await;
        Ok(false)
    }

    async fn cleanup(&self) -> Result<usize, RevocationError> {
        Ok(0)
    }

    async fn close(&self) -> Result<(), RevocationError> {
        Ok(())
    }
}
