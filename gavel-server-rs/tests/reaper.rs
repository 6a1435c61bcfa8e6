mod common;

use common::*;
use gavel_rs::clock::unix_ms;
use gavel_rs::events::ServerEvent;
use gavel_rs::types::{AuctionStatus, Money};
use gavel_rs::BidError;
use gavel_server_rs::ExpiryReaper;
use std::time::Duration;

fn reaper(h: &Harness) -> ExpiryReaper {
    ExpiryReaper::new(h.store.clone(), h.rooms.clone(), Duration::from_secs(5))
}

#[tokio::test]
async fn elects_the_highest_bidder_and_notifies_the_room() {
    let h = harness().await;
    let creator = user("ada");
    let b = user("bo");
    let c = user("cy");
    for u in [&creator, &b, &c] {
        h.store.insert_user(u).await.unwrap();
    }
    let item = auction_with_window(
        &creator,
        Money::from_dollars(100),
        Money::from_dollars(10),
        -60_000,
        -1_000,
    );
    h.store.insert_auction(&item).await.unwrap();

    let now = unix_ms();
    h.store
        .record_bid(&successful_bid(&item, &b, Money::from_dollars(110), now - 30_000))
        .await
        .unwrap();
    h.store
        .record_bid(&successful_bid(&item, &c, Money::from_dollars(120), now - 20_000))
        .await
        .unwrap();
    h.store
        .record_bid(&successful_bid(&item, &b, Money::from_dollars(130), now - 10_000))
        .await
        .unwrap();

    let mut watcher = attach_subscriber(&h.rooms, item.id, "watcher");

    let ended = reaper(&h).on_tick(now).await.unwrap();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].winner.as_ref().unwrap().user_id, b.id);
    assert_eq!(ended[0].final_amount, Money::from_dollars(130));

    let loaded = h.store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, AuctionStatus::Ended);
    assert_eq!(loaded.winner_user_id, Some(b.id));

    match watcher.try_recv().unwrap() {
        ServerEvent::AuctionEndedNotification {
            auction_item_id,
            winner_user_id,
            winner_username,
            final_bid_amount_in_dollars,
            auction_ended_at_timestamp,
        } => {
            assert_eq!(auction_item_id, item.id);
            assert_eq!(winner_user_id, Some(b.id));
            assert_eq!(winner_username.as_deref(), Some("bo"));
            assert_eq!(final_bid_amount_in_dollars, Money::from_dollars(130));
            assert_eq!(auction_ended_at_timestamp, item.end_time_ms);
        }
        other => panic!("expected end notification, got {other:?}"),
    }
}

#[tokio::test]
async fn reruns_over_the_same_moment_change_nothing() {
    let h = harness().await;
    let creator = user("ada");
    let bidder = user("bo");
    h.store.insert_user(&creator).await.unwrap();
    h.store.insert_user(&bidder).await.unwrap();
    let item = auction_with_window(
        &creator,
        Money::from_dollars(100),
        Money::from_dollars(10),
        -60_000,
        -1_000,
    );
    h.store.insert_auction(&item).await.unwrap();
    h.store
        .record_bid(&successful_bid(&item, &bidder, Money::from_dollars(110), unix_ms()))
        .await
        .unwrap();

    let reaper = reaper(&h);
    let now = unix_ms();

    let first = reaper.on_tick(now).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = reaper.on_tick(now).await.unwrap();
    assert!(second.is_empty());

    let loaded = h.store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.status, AuctionStatus::Ended);
    assert_eq!(loaded.winner_user_id, Some(bidder.id));
}

#[tokio::test]
async fn auction_without_bids_ends_winnerless() {
    let h = harness().await;
    let creator = user("ada");
    h.store.insert_user(&creator).await.unwrap();
    let item = auction_with_window(
        &creator,
        Money::from_dollars(100),
        Money::from_dollars(10),
        -60_000,
        -1_000,
    );
    h.store.insert_auction(&item).await.unwrap();

    let mut watcher = attach_subscriber(&h.rooms, item.id, "watcher");
    let ended = reaper(&h).on_tick(unix_ms()).await.unwrap();
    assert_eq!(ended[0].winner, None);

    match watcher.try_recv().unwrap() {
        ServerEvent::AuctionEndedNotification { winner_user_id, winner_username, .. } => {
            assert_eq!(winner_user_id, None);
            assert_eq!(winner_username, None);
        }
        other => panic!("expected end notification, got {other:?}"),
    }
}

/// A bid racing the close commits either before the flip (and wins the
/// auction) or after it (and is rejected); the two outcomes are exclusive.
#[tokio::test]
async fn bid_and_expiry_never_both_commit() {
    // order 1: the bid lands first, the reaper then ends with that winner
    let h = harness().await;
    let creator = user("ada");
    let bidder = user("bo");
    h.store.insert_user(&creator).await.unwrap();
    h.store.insert_user(&bidder).await.unwrap();
    let item = auction_with_window(
        &creator,
        Money::from_dollars(100),
        Money::from_dollars(10),
        -60_000,
        2_000,
    );
    h.store.insert_auction(&item).await.unwrap();

    h.pipeline
        .place_bid(item.id, bidder.id, "bo", Money::from_dollars(110))
        .await
        .unwrap();
    let ended = reaper(&h).on_tick(item.end_time_ms).await.unwrap();
    assert_eq!(ended[0].winner.as_ref().unwrap().user_id, bidder.id);

    // order 2: the reaper flips first, the bid then sees a closed auction
    let h = harness().await;
    h.store.insert_user(&creator).await.unwrap();
    h.store.insert_user(&bidder).await.unwrap();
    let item = auction_with_window(
        &creator,
        Money::from_dollars(100),
        Money::from_dollars(10),
        -60_000,
        -1,
    );
    h.store.insert_auction(&item).await.unwrap();

    let ended = reaper(&h).on_tick(unix_ms()).await.unwrap();
    assert_eq!(ended.len(), 1);
    assert_eq!(
        h.pipeline
            .place_bid(item.id, bidder.id, "bo", Money::from_dollars(110))
            .await
            .unwrap_err(),
        BidError::AuctionEnded
    );
    let loaded = h.store.find_auction_by_id(&item.id).await.unwrap().unwrap();
    assert_eq!(loaded.winner_user_id, None);
    assert_eq!(loaded.current_highest_bid, Money::from_dollars(100));
}
