mod auction;
mod bid;
mod money;
mod user;

pub use auction::{Auction, AuctionStatus, UnknownStatus};
pub use bid::Bid;
pub use money::{Money, MoneyError};
pub use user::User;

use uuid::Uuid;

pub type AuctionId = Uuid;
pub type BidId = Uuid;
pub type UserId = Uuid;
pub type ConnectionId = Uuid;
