use crate::coordinator::CoordinatorError;
use crate::store::StoreError;
use crate::types::Money;
use thiserror::Error;

/// Outcome taxonomy of the place-bid path. These never propagate as panics;
/// the gateway turns them into `BID_PLACED_ERROR` frames using [`code`].
///
/// [`code`]: BidError::code
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BidError {
    #[error("bid amount must be positive with at most two fractional digits")]
    InvalidAmount,
    #[error("auction not found")]
    AuctionNotFound,
    #[error("auction has already ended")]
    AuctionEnded,
    #[error("auction has not started yet")]
    AuctionNotStarted,
    #[error("creators cannot bid on their own auctions")]
    OwnAuction,
    #[error("bid too low; the next acceptable bid is {required}")]
    BidTooLow { required: Money },
    #[error("another bid on this auction is in flight")]
    LockUnavailable,
    #[error("bid lost a race with a concurrent update")]
    Conflict,
    #[error("coordinator unavailable")]
    CoordinatorUnavailable,
    #[error("store unavailable")]
    StoreUnavailable,
    #[error("internal error")]
    Internal,
}

impl BidError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAmount => "INVALID_AMOUNT",
            Self::AuctionNotFound => "AUCTION_NOT_FOUND",
            Self::AuctionEnded => "AUCTION_ENDED",
            Self::AuctionNotStarted => "AUCTION_NOT_STARTED",
            Self::OwnAuction => "OWN_AUCTION",
            Self::BidTooLow { .. } => "BID_TOO_LOW",
            Self::LockUnavailable => "LOCK_UNAVAILABLE",
            Self::Conflict => "CONFLICT",
            Self::CoordinatorUnavailable => "COORDINATOR_UNAVAILABLE",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// Client-attributable rejections are answered on the socket and the
    /// connection stays open; the rest are server faults.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::InvalidAmount
                | Self::AuctionNotFound
                | Self::AuctionEnded
                | Self::AuctionNotStarted
                | Self::OwnAuction
                | Self::BidTooLow { .. }
                | Self::LockUnavailable
        )
    }

    /// Safe for the client to retry immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockUnavailable | Self::Conflict)
    }
}

impl From<StoreError> for BidError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => Self::StoreUnavailable,
            StoreError::Database(err) => match err {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::Tls(_) => Self::StoreUnavailable,
                _ => Self::Internal,
            },
        }
    }
}

impl From<CoordinatorError> for BidError {
    fn from(_: CoordinatorError) -> Self {
        Self::CoordinatorUnavailable
    }
}
