//! End-to-end place-bid path: validate, take the per-auction lock, commit the
//! price bump and bid row in one transaction, refresh the advisory caches,
//! broadcast to the room. Successful bids on one auction are totally ordered
//! by the lock; the conditional update catches the remaining case of a lock
//! that expired mid-section.

use gavel_rs::clock::unix_ms;
use gavel_rs::coordinator::{keys, with_deadline, Coordinator, CACHE_TTL};
use gavel_rs::events::ServerEvent;
use gavel_rs::types::{AuctionId, AuctionStatus, Bid, BidId, Money, UserId};
use gavel_rs::{BidError, LockService, RoomRegistry, Store};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Terminal reply data for an accepted bid.
#[derive(Debug, Clone, PartialEq)]
pub struct BidReceipt {
    pub bid_id: BidId,
    pub amount: Money,
    pub accepted_at_ms: i64,
}

#[derive(Clone)]
pub struct BidPipeline {
    store: Store,
    coordinator: Arc<dyn Coordinator>,
    locks: Arc<LockService>,
    rooms: Arc<RoomRegistry>,
}

impl BidPipeline {
    pub fn new(
        store: Store,
        coordinator: Arc<dyn Coordinator>,
        locks: Arc<LockService>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        Self { store, coordinator, locks, rooms }
    }

    pub async fn place_bid(
        &self,
        auction_id: AuctionId,
        bidder_user_id: UserId,
        bidder_username: &str,
        amount: Money,
    ) -> Result<BidReceipt, BidError> {
        let started = Instant::now();

        // shape guard; fractional-digit excess is already rejected at parse
        if !amount.is_positive() {
            return Err(BidError::InvalidAmount);
        }

        let outcome = self
            .locks
            .with(auction_id, || {
                self.bid_exclusive(auction_id, bidder_user_id, bidder_username, amount, started)
            })
            .await;

        if let Err(err) = &outcome {
            self.audit_rejection(auction_id, bidder_user_id, amount, err, started)
                .await;
        }
        outcome
    }

    /// The section run under the per-auction lock.
    async fn bid_exclusive(
        &self,
        auction_id: AuctionId,
        bidder_user_id: UserId,
        bidder_username: &str,
        amount: Money,
        started: Instant,
    ) -> Result<BidReceipt, BidError> {
        let now = unix_ms();
        let auction = self
            .store
            .find_auction_by_id(&auction_id)
            .await?
            .ok_or(BidError::AuctionNotFound)?;

        if auction.status != AuctionStatus::Active || now >= auction.end_time_ms {
            return Err(BidError::AuctionEnded);
        }
        if now < auction.start_time_ms {
            return Err(BidError::AuctionNotStarted);
        }
        if auction.creator_user_id == bidder_user_id {
            return Err(BidError::OwnAuction);
        }
        let required = auction.next_required_bid().ok_or(BidError::InvalidAmount)?;
        if amount < required {
            return Err(BidError::BidTooLow { required });
        }

        let bid = Bid {
            id: Uuid::new_v4(),
            auction_id,
            bidder_user_id,
            amount,
            placed_at_ms: now,
            was_successful: true,
            processing_time_ms: started.elapsed().as_millis() as i64,
        };

        let mut txn = self.store.begin().await?;
        let bumped = self
            .store
            .conditional_price_bump(&mut txn, &auction_id, auction.current_highest_bid, amount, now)
            .await?;
        if !bumped {
            // lock TTL handover or split-brain; the row moved underneath us
            return Err(BidError::Conflict);
        }
        self.store.insert_bid(&mut txn, &bid).await?;
        let total_bids = self.store.count_successful_bids_in(&mut txn, &auction_id).await?;
        self.store.commit(txn).await?;

        self.refresh_cache(&auction_id, amount, &bidder_user_id).await;

        // broadcast before the lock is released so subscribers observe bids
        // in commit order
        self.rooms.broadcast(
            &auction_id,
            &ServerEvent::BidUpdateBroadcast {
                auction_item_id: auction_id,
                new_highest_bid_in_dollars: amount,
                highest_bidder_user_id: bidder_user_id,
                highest_bidder_username: bidder_username.to_owned(),
                bid_placed_at_timestamp: now,
                total_number_of_bids: total_bids,
            },
        );

        Ok(BidReceipt { bid_id: bid.id, amount, accepted_at_ms: now })
    }

    /// Advisory cache refresh; failures are logged and never fail the bid.
    async fn refresh_cache(&self, auction_id: &AuctionId, amount: Money, bidder: &UserId) {
        let writes = [
            (keys::current_bid(auction_id), amount.to_string()),
            (keys::highest_bidder(auction_id), bidder.to_string()),
        ];
        for (key, value) in writes {
            if let Err(err) = with_deadline(self.coordinator.put(&key, &value, CACHE_TTL)).await {
                tracing::warn!(key, %err, "could not refresh auction cache");
            }
        }
    }

    /// Best-effort audit row for a rejected attempt, outside the lock.
    async fn audit_rejection(
        &self,
        auction_id: AuctionId,
        bidder_user_id: UserId,
        amount: Money,
        err: &BidError,
        started: Instant,
    ) {
        let auditable = matches!(
            err,
            BidError::AuctionEnded
                | BidError::AuctionNotStarted
                | BidError::OwnAuction
                | BidError::BidTooLow { .. }
                | BidError::Conflict
                | BidError::Internal
        );
        if !auditable {
            return;
        }
        let attempt = Bid {
            id: Uuid::new_v4(),
            auction_id,
            bidder_user_id,
            amount,
            placed_at_ms: unix_ms(),
            was_successful: false,
            processing_time_ms: started.elapsed().as_millis() as i64,
        };
        if let Err(record_err) = self.store.record_bid(&attempt).await {
            tracing::warn!(%auction_id, %record_err, "could not record failed bid attempt");
        }
    }

    /// Room snapshot for `AUCTION_STATE_SYNC`: the advisory cache answers the
    /// current price when warm, the store is the source of truth for the
    /// rest.
    pub async fn room_snapshot(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Option<ServerEvent>, BidError> {
        let Some(auction) = self.store.find_auction_by_id(auction_id).await? else {
            return Ok(None);
        };

        let cached_bid = match with_deadline(
            self.coordinator.get(&keys::current_bid(auction_id)),
        )
        .await
        {
            Ok(value) => value.and_then(|raw| {
                raw.parse::<rust_decimal::Decimal>()
                    .ok()
                    .and_then(|decimal| Money::try_from(decimal).ok())
            }),
            Err(err) => {
                tracing::debug!(%auction_id, %err, "auction cache unavailable; using store");
                None
            }
        };
        let current_highest_bid = cached_bid.unwrap_or(auction.current_highest_bid);

        let highest_bidder = self.store.find_highest_bidder(auction_id).await?;
        let total_bids = self.store.count_successful_bids(auction_id).await?;

        Ok(Some(ServerEvent::AuctionStateSync {
            auction_item_id: *auction_id,
            current_highest_bid_in_dollars: current_highest_bid,
            highest_bidder_username: highest_bidder.map(|bidder| bidder.username),
            auction_end_time_timestamp: auction.end_time_ms,
            auction_status: auction.status,
            total_number_of_bids: total_bids,
        }))
    }
}
