use super::{AuctionId, BidId, Money, UserId};

/// A single place-bid attempt, successful or not. Rows are append-only and
/// never mutated after insertion; failed attempts are kept for audit and do
/// not alter auction state.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub id: BidId,
    pub auction_id: AuctionId,
    pub bidder_user_id: UserId,
    pub amount: Money,
    pub placed_at_ms: i64,
    pub was_successful: bool,
    pub processing_time_ms: i64,
}
