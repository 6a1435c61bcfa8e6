//! Clock-driven auction termination. One instance per replica; the guarded
//! `ACTIVE -> ENDED` flip in the store makes concurrent reapers idempotent,
//! so extra instances only cost duplicate no-op sweeps.

use gavel_rs::clock::unix_ms;
use gavel_rs::events::ServerEvent;
use gavel_rs::store::{EndedAuction, StoreError};
use gavel_rs::{RoomRegistry, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

pub struct ExpiryReaper {
    store: Store,
    rooms: Arc<RoomRegistry>,
    tick: Duration,
}

impl ExpiryReaper {
    pub fn new(store: Store, rooms: Arc<RoomRegistry>, tick: Duration) -> Self {
        Self { store, rooms, tick }
    }

    pub async fn run(&self) {
        let mut interval = time::interval(self.tick);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let now = unix_ms();
            match self.on_tick(now).await {
                Ok(ended) if !ended.is_empty() => {
                    tracing::info!(count = ended.len(), "ended expired auctions");
                }
                Ok(_) => {}
                Err(err) => {
                    // retried on the next tick
                    tracing::error!(%err, "expiry sweep failed");
                }
            }
            match self.store.cleanup_expired_revocations(now).await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "dropped expired revocations"),
                Err(err) => tracing::warn!(%err, "revocation cleanup failed"),
            }
        }
    }

    /// One sweep over `now`: flip overdue auctions, elect winners, notify
    /// rooms. Split out from [`run`] so tests can drive time explicitly.
    ///
    /// [`run`]: ExpiryReaper::run
    pub async fn on_tick(&self, now_ms: i64) -> Result<Vec<EndedAuction>, StoreError> {
        let ended_ids = self.store.end_expired_auctions(now_ms).await?;
        if ended_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ended = self.store.pick_winners(&ended_ids).await?;
        for auction in &ended {
            self.rooms.broadcast(
                &auction.auction_id,
                &ServerEvent::AuctionEndedNotification {
                    auction_item_id: auction.auction_id,
                    winner_user_id: auction.winner.as_ref().map(|winner| winner.user_id),
                    winner_username: auction
                        .winner
                        .as_ref()
                        .map(|winner| winner.username.clone()),
                    final_bid_amount_in_dollars: auction.final_amount,
                    auction_ended_at_timestamp: auction.ended_at_ms,
                },
            );
        }
        Ok(ended)
    }
}
