#![allow(dead_code)]

use gavel_rs::clock::unix_ms;
use gavel_rs::coordinator::{Coordinator, MemoryCoordinator};
use gavel_rs::events::ServerEvent;
use gavel_rs::rooms::{Subscriber, OUTBOUND_QUEUE_CAPACITY};
use gavel_rs::types::{Auction, AuctionId, AuctionStatus, Bid, Money, User};
use gavel_rs::{LockService, RoomRegistry, Store};
use gavel_server_rs::BidPipeline;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Notify;
use uuid::Uuid;

pub const LOCK_TTL: Duration = Duration::from_secs(5);

pub struct Harness {
    pub store: Store,
    pub coordinator: Arc<MemoryCoordinator>,
    pub rooms: Arc<RoomRegistry>,
    pub pipeline: BidPipeline,
}

/// Isolated in-memory DB per test; unique name prevents interference during
/// parallel execution, `cache=shared` keeps the pool on one database.
pub async fn setup_store() -> Store {
    let db_name = Uuid::new_v4().to_string();
    let url = format!("sqlite:file:{db_name}?mode=memory&cache=shared");
    let store = Store::connect(&url, Duration::from_secs(2))
        .await
        .expect("connect sqlite memory db");
    store.migrate().await.expect("migrate");
    store
}

pub async fn harness() -> Harness {
    let store = setup_store().await;
    let coordinator = Arc::new(MemoryCoordinator::new());
    let as_dyn: Arc<dyn Coordinator> = coordinator.clone();
    let rooms = Arc::new(RoomRegistry::new());
    let locks = Arc::new(LockService::new(as_dyn.clone(), LOCK_TTL));
    let pipeline = BidPipeline::new(store.clone(), as_dyn, locks, rooms.clone());
    Harness { store, coordinator, rooms, pipeline }
}

pub fn user(username: &str) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.into(),
        display_name: username.to_uppercase(),
        email: format!("{username}@example.com"),
        active: true,
    }
}

pub fn open_auction(creator: &User, starting: Money, increment: Money) -> Auction {
    auction_with_window(creator, starting, increment, -1_000, 60_000)
}

pub fn auction_with_window(
    creator: &User,
    starting: Money,
    increment: Money,
    start_in_ms: i64,
    end_in_ms: i64,
) -> Auction {
    let now = unix_ms();
    Auction {
        id: Uuid::new_v4(),
        title: "walnut credenza".into(),
        description: "mid-century, two doors".into(),
        starting_price: starting,
        current_highest_bid: starting,
        minimum_increment: increment,
        start_time_ms: now + start_in_ms,
        end_time_ms: now + end_in_ms,
        status: AuctionStatus::Active,
        creator_user_id: creator.id,
        winner_user_id: None,
        created_at_ms: now,
        updated_at_ms: now,
    }
}

pub fn successful_bid(auction: &Auction, bidder: &User, amount: Money, placed_at_ms: i64) -> Bid {
    Bid {
        id: Uuid::new_v4(),
        auction_id: auction.id,
        bidder_user_id: bidder.id,
        amount,
        placed_at_ms,
        was_successful: true,
        processing_time_ms: 2,
    }
}

/// Subscribe a synthetic connection to the auction's room, returning the
/// receiving end of its outbound queue.
pub fn attach_subscriber(
    rooms: &RoomRegistry,
    auction_id: AuctionId,
    username: &str,
) -> mpsc::Receiver<ServerEvent> {
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let subscriber = Subscriber::new(
        Uuid::new_v4(),
        Uuid::new_v4(),
        username.into(),
        tx,
        Arc::new(AtomicBool::new(false)),
        Arc::new(Notify::new()),
    );
    rooms.join(auction_id, subscriber);
    rx
}
