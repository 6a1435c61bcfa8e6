//! Socket event vocabulary. Event names and payload fields are bit-stable:
//! clients match on them verbatim, so renames here are breaking changes.

use crate::types::{AuctionId, AuctionStatus, BidId, Money, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Messages a READY connection accepts. Anything else coming off the socket
/// is ignored by the gateway.
///
/// The bid amount stays a raw [`Decimal`] here: a payload with too many
/// fractional digits must still parse so the gateway can answer it with
/// `INVALID_AMOUNT` instead of dropping the frame. The conversion to
/// [`Money`] happens at the gateway boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientEvent {
    #[serde(rename = "TIME_SYNC_REQUEST", rename_all = "camelCase")]
    TimeSyncRequest { client_timestamp_t0_in_ms: i64 },
    #[serde(rename = "JOIN_AUCTION_ROOM", rename_all = "camelCase")]
    JoinAuctionRoom { auction_item_id: AuctionId },
    #[serde(rename = "LEAVE_AUCTION_ROOM", rename_all = "camelCase")]
    LeaveAuctionRoom { auction_item_id: AuctionId },
    #[serde(rename = "PLACE_BID", rename_all = "camelCase")]
    PlaceBid {
        auction_item_id: AuctionId,
        bid_amount_in_dollars: Decimal,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "TIME_SYNC_RESPONSE", rename_all = "camelCase")]
    TimeSyncResponse {
        client_timestamp_t0_in_ms: i64,
        server_timestamp_t1_in_ms: i64,
        server_timestamp_t2_in_ms: i64,
    },
    #[serde(rename = "JOINED_AUCTION_ROOM", rename_all = "camelCase")]
    JoinedAuctionRoom { auction_item_id: AuctionId },
    #[serde(rename = "LEFT_AUCTION_ROOM", rename_all = "camelCase")]
    LeftAuctionRoom { auction_item_id: AuctionId },
    /// Full room snapshot sent once, immediately after a successful join.
    #[serde(rename = "AUCTION_STATE_SYNC", rename_all = "camelCase")]
    AuctionStateSync {
        auction_item_id: AuctionId,
        current_highest_bid_in_dollars: Money,
        highest_bidder_username: Option<String>,
        auction_end_time_timestamp: i64,
        auction_status: AuctionStatus,
        total_number_of_bids: i64,
    },
    #[serde(rename = "BID_UPDATE_BROADCAST", rename_all = "camelCase")]
    BidUpdateBroadcast {
        auction_item_id: AuctionId,
        new_highest_bid_in_dollars: Money,
        highest_bidder_user_id: UserId,
        highest_bidder_username: String,
        bid_placed_at_timestamp: i64,
        total_number_of_bids: i64,
    },
    #[serde(rename = "BID_PLACED_SUCCESS", rename_all = "camelCase")]
    BidPlacedSuccess {
        auction_item_id: AuctionId,
        bid_amount_in_dollars: Money,
        bid_id: BidId,
        bid_placed_at_timestamp: i64,
    },
    #[serde(rename = "BID_PLACED_ERROR", rename_all = "camelCase")]
    BidPlacedError {
        auction_item_id: AuctionId,
        error_code: String,
        error_message: String,
    },
    #[serde(rename = "AUCTION_ENDED_NOTIFICATION", rename_all = "camelCase")]
    AuctionEndedNotification {
        auction_item_id: AuctionId,
        winner_user_id: Option<UserId>,
        winner_username: Option<String>,
        final_bid_amount_in_dollars: Money,
        auction_ended_at_timestamp: i64,
    },
}
