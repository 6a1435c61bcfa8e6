pub mod gateway;
pub mod pipeline;
pub mod reaper;
mod service;
pub mod timesync;

pub use gateway::Gateway;
pub use pipeline::BidPipeline;
pub use reaper::ExpiryReaper;
pub use service::Service;
