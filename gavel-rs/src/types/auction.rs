use super::{AuctionId, Money, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuctionStatus {
    Active,
    Ended,
    Cancelled,
}

#[derive(Debug, Error)]
#[error("unknown auction status `{0}`")]
pub struct UnknownStatus(String);

impl AuctionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Ended => "ENDED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for AuctionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuctionStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "ENDED" => Ok(Self::Ended),
            "CANCELLED" => Ok(Self::Cancelled),
            other => Err(UnknownStatus(other.into())),
        }
    }
}

/// One auctioned item. Mutated only by the bid pipeline (monotonic price
/// bumps) and the expiry reaper (status flip and winner assignment).
#[derive(Debug, Clone, PartialEq)]
pub struct Auction {
    pub id: AuctionId,
    pub title: String,
    pub description: String,
    pub starting_price: Money,
    pub current_highest_bid: Money,
    pub minimum_increment: Money,
    pub start_time_ms: i64,
    pub end_time_ms: i64,
    pub status: AuctionStatus,
    pub creator_user_id: UserId,
    pub winner_user_id: Option<UserId>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Auction {
    /// The smallest amount the next bid must reach.
    pub fn next_required_bid(&self) -> Option<Money> {
        self.current_highest_bid.checked_add(self.minimum_increment)
    }
}
