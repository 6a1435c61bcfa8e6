use gavel_rs::clock::unix_ms;
use gavel_rs::store::Store;
use gavel_rs::types::{Auction, AuctionStatus, Bid, Money, User};
use std::time::Duration;
use uuid::Uuid;

/// Isolated in-memory DB per test. The unique name prevents interference
/// during parallel execution; `cache=shared` lets every connection in the
/// pool see the same database.
async fn setup_store() -> Store {
    let db_name = Uuid::new_v4().to_string();
    let url = format!("sqlite:file:{db_name}?mode=memory&cache=shared");
    let store = Store::connect(&url, Duration::from_secs(2))
        .await
        .expect("connect sqlite memory db");
    store.migrate().await.expect("migrate");
    store
}

fn user(username: &str) -> User {
    User {
        id: Uuid::new_v4(),
        username: username.into(),
        display_name: username.to_uppercase(),
        email: format!("{username}@example.com"),
        active: true,
    }
}

fn auction(creator: &User, starting: Money, increment: Money, end_in_ms: i64) -> Auction {
    let now = unix_ms();
    Auction {
        id: Uuid::new_v4(),
        title: "walnut credenza".into(),
        description: "mid-century, two doors".into(),
        starting_price: starting,
        current_highest_bid: starting,
        minimum_increment: increment,
        start_time_ms: now - 1_000,
        end_time_ms: now + end_in_ms,
        status: AuctionStatus::Active,
        creator_user_id: creator.id,
        winner_user_id: None,
        created_at_ms: now,
        updated_at_ms: now,
    }
}

fn successful_bid(auction: &Auction, bidder: &User, amount: Money, placed_at_ms: i64) -> Bid {
    Bid {
        id: Uuid::new_v4(),
        auction_id: auction.id,
        bidder_user_id: bidder.id,
        amount,
        placed_at_ms,
        was_successful: true,
        processing_time_ms: 3,
    }
}

#[tokio::test]
async fn auction_roundtrip() {
    let store = setup_store().await;
    let creator = user("ada");
    store.insert_user(&creator).await.unwrap();

    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    store.insert_auction(&item).await.unwrap();

    let loaded = store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded, item);
    assert_eq!(loaded.winner_user_id, None);

    assert!(store.find_auction_by_id(&Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn username_is_unique() {
    let store = setup_store().await;
    store.insert_user(&user("ada")).await.unwrap();
    assert!(store.insert_user(&user("ada")).await.is_err());
}

#[tokio::test]
async fn conditional_bump_requires_matching_price() {
    let store = setup_store().await;
    let creator = user("ada");
    store.insert_user(&creator).await.unwrap();
    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    store.insert_auction(&item).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    let bumped = store
        .conditional_price_bump(
            &mut txn,
            &item.id,
            Money::from_dollars(100),
            Money::from_dollars(110),
            unix_ms(),
        )
        .await
        .unwrap();
    assert!(bumped);
    store.commit(txn).await.unwrap();

    // stale expectation loses
    let mut txn = store.begin().await.unwrap();
    let bumped = store
        .conditional_price_bump(
            &mut txn,
            &item.id,
            Money::from_dollars(100),
            Money::from_dollars(120),
            unix_ms(),
        )
        .await
        .unwrap();
    assert!(!bumped);
    drop(txn);

    let loaded = store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.current_highest_bid, Money::from_dollars(110));
}

#[tokio::test]
async fn bump_refuses_inactive_auctions() {
    let store = setup_store().await;
    let creator = user("ada");
    store.insert_user(&creator).await.unwrap();
    let mut item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    item.status = AuctionStatus::Ended;
    store.insert_auction(&item).await.unwrap();

    let mut txn = store.begin().await.unwrap();
    let bumped = store
        .conditional_price_bump(
            &mut txn,
            &item.id,
            Money::from_dollars(100),
            Money::from_dollars(110),
            unix_ms(),
        )
        .await
        .unwrap();
    assert!(!bumped);
}

#[tokio::test]
async fn counts_only_successful_bids() {
    let store = setup_store().await;
    let creator = user("ada");
    let bidder = user("bo");
    store.insert_user(&creator).await.unwrap();
    store.insert_user(&bidder).await.unwrap();
    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    store.insert_auction(&item).await.unwrap();

    let now = unix_ms();
    store
        .record_bid(&successful_bid(&item, &bidder, Money::from_dollars(110), now))
        .await
        .unwrap();
    let mut failed = successful_bid(&item, &bidder, Money::from_dollars(105), now + 1);
    failed.was_successful = false;
    store.record_bid(&failed).await.unwrap();

    assert_eq!(store.count_successful_bids(&item.id).await.unwrap(), 1);
}

#[tokio::test]
async fn highest_bidder_breaks_ties_by_time_then_id() {
    let store = setup_store().await;
    let creator = user("ada");
    let early = user("bo");
    let late = user("cy");
    for u in [&creator, &early, &late] {
        store.insert_user(u).await.unwrap();
    }
    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    store.insert_auction(&item).await.unwrap();

    let amount = Money::from_dollars(140);
    store
        .record_bid(&successful_bid(&item, &late, amount, 2_000))
        .await
        .unwrap();
    store
        .record_bid(&successful_bid(&item, &early, amount, 1_000))
        .await
        .unwrap();

    let winner = store.find_highest_bidder(&item.id).await.unwrap().unwrap();
    assert_eq!(winner.user_id, early.id);
    assert_eq!(winner.username, "bo");

    // same amount, same millisecond: lexicographically smallest bid id wins
    let store = setup_store().await;
    for u in [&creator, &early, &late] {
        store.insert_user(u).await.unwrap();
    }
    store.insert_auction(&item).await.unwrap();
    let mut first = successful_bid(&item, &early, amount, 1_000);
    let mut second = successful_bid(&item, &late, amount, 1_000);
    first.id = Uuid::parse_str("00000000-0000-4000-8000-000000000001").unwrap();
    second.id = Uuid::parse_str("ffffffff-ffff-4fff-8fff-ffffffffffff").unwrap();
    store.record_bid(&second).await.unwrap();
    store.record_bid(&first).await.unwrap();

    let winner = store.find_highest_bidder(&item.id).await.unwrap().unwrap();
    assert_eq!(winner.user_id, early.id);
}

#[tokio::test]
async fn expiry_sweep_is_idempotent() {
    let store = setup_store().await;
    let creator = user("ada");
    store.insert_user(&creator).await.unwrap();

    let overdue = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), -1);
    let open = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), 60_000);
    store.insert_auction(&overdue).await.unwrap();
    store.insert_auction(&open).await.unwrap();

    let now = unix_ms();
    let ended = store.end_expired_auctions(now).await.unwrap();
    assert_eq!(ended, vec![overdue.id]);

    let flipped = store.find_auction_by_id(&overdue.id).await.unwrap().unwrap();
    assert_eq!(flipped.status, AuctionStatus::Ended);
    let untouched = store.find_auction_by_id(&open.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, AuctionStatus::Active);

    // second sweep over the same moment finds nothing to do
    assert!(store.end_expired_auctions(now).await.unwrap().is_empty());
}

#[tokio::test]
async fn winner_assignment_is_stable() {
    let store = setup_store().await;
    let creator = user("ada");
    let bidder = user("bo");
    store.insert_user(&creator).await.unwrap();
    store.insert_user(&bidder).await.unwrap();

    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), -1);
    store.insert_auction(&item).await.unwrap();
    store
        .record_bid(&successful_bid(&item, &bidder, Money::from_dollars(130), unix_ms()))
        .await
        .unwrap();

    let ids = store.end_expired_auctions(unix_ms()).await.unwrap();
    let first = store.pick_winners(&ids).await.unwrap();
    let second = store.pick_winners(&ids).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first[0].winner.as_ref().unwrap().user_id, bidder.id);

    let loaded = store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.winner_user_id, Some(bidder.id));
    assert_eq!(loaded.status, AuctionStatus::Ended);
}

#[tokio::test]
async fn auction_without_bids_ends_without_winner() {
    let store = setup_store().await;
    let creator = user("ada");
    store.insert_user(&creator).await.unwrap();
    let item = auction(&creator, Money::from_dollars(100), Money::from_dollars(10), -1);
    store.insert_auction(&item).await.unwrap();

    let ids = store.end_expired_auctions(unix_ms()).await.unwrap();
    let ended = store.pick_winners(&ids).await.unwrap();
    assert_eq!(ended[0].winner, None);
    assert_eq!(ended[0].final_amount, Money::from_dollars(100));

    let loaded = store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.winner_user_id, None);
}

#[tokio::test]
async fn revocations_roundtrip_and_expire() {
    let store = setup_store().await;
    let now = unix_ms();

    store
        .insert_revoked_credential("token-a", now, now + 60_000)
        .await
        .unwrap();
    store
        .insert_revoked_credential("token-b", now - 120_000, now - 60_000)
        .await
        .unwrap();

    assert_eq!(
        store.lookup_revoked_credential("token-a").await.unwrap(),
        Some(now + 60_000)
    );
    assert_eq!(store.lookup_revoked_credential("missing").await.unwrap(), None);

    let removed = store.cleanup_expired_revocations(now).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.lookup_revoked_credential("token-b").await.unwrap(), None);
    assert!(store
        .lookup_revoked_credential("token-a")
        .await
        .unwrap()
        .is_some());
}
