pub mod clock;
pub mod config;
pub mod coordinator;
mod error;
pub mod events;
pub mod lock;
pub mod rooms;
pub mod signing;
pub mod store;
pub mod types;

pub use error::BidError;
pub use lock::LockService;
pub use rooms::RoomRegistry;
pub use store::Store;
