//! Coordinator seam: a key/value service with TTLs, compare-and-set, and
//! atomic check-and-delete. The per-auction bid lock and the advisory caches
//! live behind this trait; the reference single-replica deployment runs the
//! in-process implementation, and a networked service slots in behind the
//! same interface.

mod memory;

pub use memory::MemoryCoordinator;

use crate::types::AuctionId;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Deadline applied to every coordinator call.
pub const OP_DEADLINE: Duration = Duration::from_secs(2);

/// Lifetime of the advisory auction caches.
pub const CACHE_TTL: Duration = Duration::from_secs(60);

/// Upper bound on how long a revocation marker is cached.
pub const REVOCATION_CACHE_CAP: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("coordinator request timed out")]
    Timeout,
    #[error("coordinator unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Set `key` to `value` with a time-to-live, only if `key` is absent.
    /// Returns whether the write happened.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinatorError>;

    /// Unconditional TTL'd write.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CoordinatorError>;

    async fn get(&self, key: &str) -> Result<Option<String>, CoordinatorError>;

    /// Delete `key` only if its current value equals `expected`; the compare
    /// and the delete are atomic. Returns whether a delete happened.
    async fn delete_if_equals(&self, key: &str, expected: &str)
        -> Result<bool, CoordinatorError>;
}

/// Bound a coordinator call by the operation deadline.
pub async fn with_deadline<T>(
    fut: impl Future<Output = Result<T, CoordinatorError>>,
) -> Result<T, CoordinatorError> {
    match tokio::time::timeout(OP_DEADLINE, fut).await {
        Ok(result) => result,
        Err(_) => Err(CoordinatorError::Timeout),
    }
}

/// Construct a coordinator from `COORDINATOR_URL`. The `mem:` scheme selects
/// the in-process implementation.
pub fn from_url(url: &str) -> anyhow::Result<Arc<dyn Coordinator>> {
    match url.split(':').next() {
        Some("mem") => Ok(Arc::new(MemoryCoordinator::new())),
        Some(scheme) => anyhow::bail!("unsupported coordinator scheme `{scheme}`"),
        None => anyhow::bail!("invalid coordinator url"),
    }
}

pub mod keys {
    use super::AuctionId;

    pub fn bid_lock(auction_id: &AuctionId) -> String {
        format!("lock:bid:{auction_id}")
    }

    pub fn current_bid(auction_id: &AuctionId) -> String {
        format!("auction:current-bid:{auction_id}")
    }

    pub fn highest_bidder(auction_id: &AuctionId) -> String {
        format!("auction:highest-bidder:{auction_id}")
    }

    pub fn revoked(credential: &str) -> String {
        format!("revoked:{credential}")
    }
}
