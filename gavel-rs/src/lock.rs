//! Per-auction mutual exclusion over the coordinator: a TTL'd set-if-absent
//! claims the lock, a token-matched delete releases it. The TTL bounds the
//! worst-case hold if a holder dies mid-section.

use crate::coordinator::{keys, with_deadline, Coordinator, CoordinatorError};
use crate::types::AuctionId;
use crate::BidError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub struct LockService {
    coordinator: Arc<dyn Coordinator>,
    ttl: Duration,
}

impl LockService {
    pub fn new(coordinator: Arc<dyn Coordinator>, ttl: Duration) -> Self {
        Self { coordinator, ttl }
    }

    /// Try to claim the lock for `auction_id`. Returns the holder token on
    /// success, `None` when another holder has it. Never retried here; the
    /// caller surfaces a transient error and lets the client retry.
    pub async fn acquire(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Option<String>, CoordinatorError> {
        let token = hex::encode(rand::random::<[u8; 16]>());
        let claimed = with_deadline(self.coordinator.set_if_absent(
            &keys::bid_lock(auction_id),
            &token,
            self.ttl,
        ))
        .await?;
        Ok(claimed.then_some(token))
    }

    /// Release the lock held under `token`. A non-matching delete is a no-op
    /// on the coordinator, so releasing after TTL handover is harmless.
    pub async fn release(
        &self,
        auction_id: &AuctionId,
        token: &str,
    ) -> Result<bool, CoordinatorError> {
        with_deadline(
            self.coordinator
                .delete_if_equals(&keys::bid_lock(auction_id), token),
        )
        .await
    }

    /// Run `f` while holding the lock for `auction_id`. The release runs on
    /// every exit path: normal return, error, panic, and cancellation (the
    /// guard spawns a token-matched delete if the future is dropped).
    pub async fn with<F, Fut, T>(&self, auction_id: AuctionId, f: F) -> Result<T, BidError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, BidError>>,
    {
        let token = match self.acquire(&auction_id).await {
            Ok(Some(token)) => token,
            Ok(None) => return Err(BidError::LockUnavailable),
            Err(err) => {
                tracing::warn!(%auction_id, %err, "could not reach coordinator for bid lock");
                return Err(BidError::CoordinatorUnavailable);
            }
        };

        let mut guard = ReleaseGuard {
            coordinator: self.coordinator.clone(),
            key: keys::bid_lock(&auction_id),
            token: token.clone(),
            armed: true,
        };

        let result = f().await;

        guard.armed = false;
        drop(guard);
        if let Err(err) = self.release(&auction_id, &token).await {
            // the TTL will reap it; nothing actionable beyond the log
            tracing::warn!(%auction_id, %err, "failed to release bid lock");
        }
        result
    }
}

struct ReleaseGuard {
    coordinator: Arc<dyn Coordinator>,
    key: String,
    token: String,
    armed: bool,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let coordinator = self.coordinator.clone();
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        tokio::spawn(async move {
            if let Err(err) = coordinator.delete_if_equals(&key, &token).await {
                tracing::warn!(key, %err, "failed to release bid lock from guard");
            }
        });
    }
}
