//! Thin boundary over the relational store. Portable SQL only (TEXT, BIGINT,
//! BOOLEAN, `$n` placeholders) so the same adapter runs against Postgres in
//! production and in-memory SQLite in tests. Monetary columns are integer
//! cents; timestamps are epoch milliseconds.

use crate::types::{Auction, AuctionId, AuctionStatus, Bid, Money, User, UserId};
use sqlx::any::{install_default_drivers, AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Row, Transaction};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS users (
        user_id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        email TEXT NOT NULL,
        active BOOLEAN NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS auctions (
        auction_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        starting_price_cents BIGINT NOT NULL,
        current_highest_bid_cents BIGINT NOT NULL,
        minimum_increment_cents BIGINT NOT NULL,
        start_time_ms BIGINT NOT NULL,
        end_time_ms BIGINT NOT NULL,
        status TEXT NOT NULL,
        creator_user_id TEXT NOT NULL,
        winner_user_id TEXT,
        created_at_ms BIGINT NOT NULL,
        updated_at_ms BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS bids (
        bid_id TEXT PRIMARY KEY,
        auction_id TEXT NOT NULL,
        bidder_user_id TEXT NOT NULL,
        amount_cents BIGINT NOT NULL,
        placed_at_ms BIGINT NOT NULL,
        was_successful BOOLEAN NOT NULL,
        processing_time_ms BIGINT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS revoked_credentials (
        credential TEXT PRIMARY KEY,
        revoked_at_ms BIGINT NOT NULL,
        expires_at_ms BIGINT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_bids_by_auction
        ON bids (auction_id, was_successful, amount_cents)",
    "CREATE INDEX IF NOT EXISTS idx_auctions_by_expiry
        ON auctions (status, end_time_ms)",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request timed out")]
    Timeout,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighestBidder {
    pub user_id: UserId,
    pub username: String,
}

/// Result of ending one auction, carried into the end-of-auction broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct EndedAuction {
    pub auction_id: AuctionId,
    pub winner: Option<HighestBidder>,
    pub final_amount: Money,
    pub ended_at_ms: i64,
}

#[derive(Clone)]
pub struct Store {
    pool: AnyPool,
    op_deadline: Duration,
}

impl Store {
    pub async fn connect(url: &str, op_deadline: Duration) -> Result<Self, StoreError> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(16)
            .acquire_timeout(op_deadline)
            .connect(url)
            .await?;
        Ok(Self { pool, op_deadline })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Bound a store call by the operation deadline.
    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.op_deadline, fut).await {
            Ok(result) => result.map_err(StoreError::from),
            Err(_) => Err(StoreError::Timeout),
        }
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Any>, StoreError> {
        self.bounded(self.pool.begin()).await
    }

    pub async fn commit(&self, txn: Transaction<'static, Any>) -> Result<(), StoreError> {
        self.bounded(txn.commit()).await
    }

    pub async fn find_auction_by_id(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Option<Auction>, StoreError> {
        let row = self
            .bounded(
                sqlx::query("SELECT * FROM auctions WHERE auction_id = $1")
                    .bind(auction_id.to_string())
                    .fetch_optional(&self.pool),
            )
            .await?;
        row.map(|row| decode_auction(&row)).transpose().map_err(StoreError::from)
    }

    /// Conditional monotonic price update. Affects zero rows when the row's
    /// current price no longer matches what the caller read, or when the
    /// auction is no longer active; the caller treats that as a conflict.
    pub async fn conditional_price_bump(
        &self,
        txn: &mut Transaction<'static, Any>,
        auction_id: &AuctionId,
        expected_current: Money,
        new_price: Money,
        updated_at_ms: i64,
    ) -> Result<bool, StoreError> {
        let result = self
            .bounded(
                sqlx::query(
                    "UPDATE auctions
                     SET current_highest_bid_cents = $1, updated_at_ms = $2
                     WHERE auction_id = $3
                       AND current_highest_bid_cents = $4
                       AND status = $5",
                )
                .bind(new_price.cents())
                .bind(updated_at_ms)
                .bind(auction_id.to_string())
                .bind(expected_current.cents())
                .bind(AuctionStatus::Active.as_str())
                .execute(&mut **txn),
            )
            .await?;
        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_bid(
        &self,
        txn: &mut Transaction<'static, Any>,
        bid: &Bid,
    ) -> Result<(), StoreError> {
        self.bounded(
            bind_bid(
                sqlx::query(
                    "INSERT INTO bids (bid_id, auction_id, bidder_user_id, amount_cents,
                                       placed_at_ms, was_successful, processing_time_ms)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                ),
                bid,
            )
            .execute(&mut **txn),
        )
        .await?;
        Ok(())
    }

    /// Audit insert outside any transaction, used for failed attempts.
    pub async fn record_bid(&self, bid: &Bid) -> Result<(), StoreError> {
        self.bounded(
            bind_bid(
                sqlx::query(
                    "INSERT INTO bids (bid_id, auction_id, bidder_user_id, amount_cents,
                                       placed_at_ms, was_successful, processing_time_ms)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                ),
                bid,
            )
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn count_successful_bids(
        &self,
        auction_id: &AuctionId,
    ) -> Result<i64, StoreError> {
        self.bounded(
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM bids WHERE auction_id = $1 AND was_successful = $2",
            )
            .bind(auction_id.to_string())
            .bind(true)
            .fetch_one(&self.pool),
        )
        .await
    }

    /// Same count, read inside an open transaction so it includes rows the
    /// transaction itself inserted.
    pub async fn count_successful_bids_in(
        &self,
        txn: &mut Transaction<'static, Any>,
        auction_id: &AuctionId,
    ) -> Result<i64, StoreError> {
        self.bounded(
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM bids WHERE auction_id = $1 AND was_successful = $2",
            )
            .bind(auction_id.to_string())
            .bind(true)
            .fetch_one(&mut **txn),
        )
        .await
    }

    /// The bidder of the best successful bid: highest amount, then earliest
    /// placement, then smallest bid id for bids within the same millisecond.
    pub async fn find_highest_bidder(
        &self,
        auction_id: &AuctionId,
    ) -> Result<Option<HighestBidder>, StoreError> {
        let row = self
            .bounded(
                sqlx::query(
                    "SELECT b.bidder_user_id, u.username
                     FROM bids b JOIN users u ON u.user_id = b.bidder_user_id
                     WHERE b.auction_id = $1 AND b.was_successful = $2
                     ORDER BY b.amount_cents DESC, b.placed_at_ms ASC, b.bid_id ASC
                     LIMIT 1",
                )
                .bind(auction_id.to_string())
                .bind(true)
                .fetch_optional(&self.pool),
            )
            .await?;
        row.map(|row| {
            Ok::<_, sqlx::Error>(HighestBidder {
                user_id: decode_uuid(&row, "bidder_user_id")?,
                username: row.try_get("username")?,
            })
        })
        .transpose()
        .map_err(StoreError::from)
    }

    /// Flip every overdue ACTIVE auction to ENDED and return the affected
    /// ids. The status guard in the UPDATE is the serialization point across
    /// replicas; re-running over the same moment affects nothing.
    pub async fn end_expired_auctions(
        &self,
        now_ms: i64,
    ) -> Result<Vec<AuctionId>, StoreError> {
        let mut txn = self.begin().await?;
        let rows = self
            .bounded(
                sqlx::query(
                    "SELECT auction_id FROM auctions WHERE status = $1 AND end_time_ms <= $2",
                )
                .bind(AuctionStatus::Active.as_str())
                .bind(now_ms)
                .fetch_all(&mut *txn),
            )
            .await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(
            sqlx::query(
                "UPDATE auctions SET status = $1, updated_at_ms = $2
                 WHERE status = $3 AND end_time_ms <= $4",
            )
            .bind(AuctionStatus::Ended.as_str())
            .bind(now_ms)
            .bind(AuctionStatus::Active.as_str())
            .bind(now_ms)
            .execute(&mut *txn),
        )
        .await?;
        self.commit(txn).await?;

        rows.iter()
            .map(|row| decode_uuid(row, "auction_id").map_err(StoreError::from))
            .collect()
    }

    /// Assign winners to freshly ended auctions. The winner query is
    /// deterministic and the update guards on `winner_user_id IS NULL`, so
    /// concurrent reapers elect the same winner exactly once.
    pub async fn pick_winners(
        &self,
        auction_ids: &[AuctionId],
    ) -> Result<Vec<EndedAuction>, StoreError> {
        let mut ended = Vec::with_capacity(auction_ids.len());
        for auction_id in auction_ids {
            let Some(auction) = self.find_auction_by_id(auction_id).await? else {
                continue;
            };
            let winner = self.find_highest_bidder(auction_id).await?;
            if let Some(winner) = &winner {
                self.bounded(
                    sqlx::query(
                        "UPDATE auctions SET winner_user_id = $1
                         WHERE auction_id = $2 AND winner_user_id IS NULL",
                    )
                    .bind(winner.user_id.to_string())
                    .bind(auction_id.to_string())
                    .execute(&self.pool),
                )
                .await?;
            }
            ended.push(EndedAuction {
                auction_id: *auction_id,
                winner,
                final_amount: auction.current_highest_bid,
                ended_at_ms: auction.end_time_ms,
            });
        }
        Ok(ended)
    }

    pub async fn insert_revoked_credential(
        &self,
        credential: &str,
        revoked_at_ms: i64,
        expires_at_ms: i64,
    ) -> Result<(), StoreError> {
        self.bounded(
            sqlx::query(
                "INSERT INTO revoked_credentials (credential, revoked_at_ms, expires_at_ms)
                 VALUES ($1, $2, $3)",
            )
            .bind(credential)
            .bind(revoked_at_ms)
            .bind(expires_at_ms)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    /// Returns the revocation's own expiry when the credential is revoked.
    pub async fn lookup_revoked_credential(
        &self,
        credential: &str,
    ) -> Result<Option<i64>, StoreError> {
        self.bounded(
            sqlx::query_scalar(
                "SELECT expires_at_ms FROM revoked_credentials WHERE credential = $1",
            )
            .bind(credential)
            .fetch_optional(&self.pool),
        )
        .await
    }

    pub async fn cleanup_expired_revocations(&self, now_ms: i64) -> Result<u64, StoreError> {
        let result = self
            .bounded(
                sqlx::query("DELETE FROM revoked_credentials WHERE expires_at_ms <= $1")
                    .bind(now_ms)
                    .execute(&self.pool),
            )
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        self.bounded(
            sqlx::query(
                "INSERT INTO users (user_id, username, display_name, email, active)
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(user.id.to_string())
            .bind(&user.username)
            .bind(&user.display_name)
            .bind(&user.email)
            .bind(user.active)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    pub async fn insert_auction(&self, auction: &Auction) -> Result<(), StoreError> {
        self.bounded(
            sqlx::query(
                "INSERT INTO auctions (auction_id, title, description, starting_price_cents,
                                       current_highest_bid_cents, minimum_increment_cents,
                                       start_time_ms, end_time_ms, status, creator_user_id,
                                       winner_user_id, created_at_ms, updated_at_ms)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
            )
            .bind(auction.id.to_string())
            .bind(&auction.title)
            .bind(&auction.description)
            .bind(auction.starting_price.cents())
            .bind(auction.current_highest_bid.cents())
            .bind(auction.minimum_increment.cents())
            .bind(auction.start_time_ms)
            .bind(auction.end_time_ms)
            .bind(auction.status.as_str())
            .bind(auction.creator_user_id.to_string())
            .bind(auction.winner_user_id.map(|id| id.to_string()))
            .bind(auction.created_at_ms)
            .bind(auction.updated_at_ms)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

fn bind_bid<'q>(
    query: sqlx::query::Query<'q, Any, sqlx::any::AnyArguments<'q>>,
    bid: &Bid,
) -> sqlx::query::Query<'q, Any, sqlx::any::AnyArguments<'q>> {
    query
        .bind(bid.id.to_string())
        .bind(bid.auction_id.to_string())
        .bind(bid.bidder_user_id.to_string())
        .bind(bid.amount.cents())
        .bind(bid.placed_at_ms)
        .bind(bid.was_successful)
        .bind(bid.processing_time_ms)
}

fn decode_uuid(row: &AnyRow, column: &str) -> Result<uuid::Uuid, sqlx::Error> {
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|err: uuid::Error| sqlx::Error::Decode(err.into()))
}

fn decode_auction(row: &AnyRow) -> Result<Auction, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let winner: Option<String> = row.try_get("winner_user_id")?;
    Ok(Auction {
        id: decode_uuid(row, "auction_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        starting_price: Money::from_cents(row.try_get("starting_price_cents")?),
        current_highest_bid: Money::from_cents(row.try_get("current_highest_bid_cents")?),
        minimum_increment: Money::from_cents(row.try_get("minimum_increment_cents")?),
        start_time_ms: row.try_get("start_time_ms")?,
        end_time_ms: row.try_get("end_time_ms")?,
        status: status
            .parse()
            .map_err(|err: crate::types::UnknownStatus| sqlx::Error::Decode(err.into()))?,
        creator_user_id: decode_uuid(row, "creator_user_id")?,
        winner_user_id: winner
            .map(|raw| raw.parse().map_err(|err: uuid::Error| sqlx::Error::Decode(err.into())))
            .transpose()?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}
