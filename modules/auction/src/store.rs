//! Outbox store
//!
//! Persists auction state and outbox records under one atomic boundary. The
//! relay only needs the [`OutboxStore`] half; the command path needs the full
//! [`AuctionStore`].

use async_trait::async_trait;
use auction_contracts::{AuctionEnvelope, SOURCE_MODULE};
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Auction;
use crate::mutator::StateChange;
use crate::repos::outbox_repo::OutboxRow;
use crate::repos::{auction_repo, outbox_repo};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The row changed between read and conditional write
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be turned back into a domain value
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// An envelope waiting in (or delivered from) the outbox
///
/// The relay routes on the stored columns and publishes `body` untouched, so
/// it never has to understand the payload. A kind this build does not know
/// still goes out.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    /// Insertion sequence; the relay drains in this order
    pub seq: i64,
    pub envelope_id: Uuid,
    pub aggregate_id: String,
    pub event_kind: String,
    /// Serialized envelope exactly as committed
    pub body: serde_json::Value,
    pub delivered: bool,
    pub attempt_count: i32,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl OutboxRecord {
    /// Fresh undelivered record for `envelope`
    pub fn pending(
        seq: i64,
        envelope: &AuctionEnvelope,
        created_at: DateTime<Utc>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            seq,
            envelope_id: envelope.envelope_id,
            aggregate_id: envelope.aggregate_id.clone(),
            event_kind: envelope.event_kind.clone(),
            body: serde_json::to_value(envelope)?,
            delivered: false,
            attempt_count: 0,
            created_at,
            delivered_at: None,
            last_error: None,
        })
    }

    pub fn subject(&self) -> String {
        format!("{}.events.{}", SOURCE_MODULE, self.event_kind)
    }

    /// Typed view of the body; fails for kinds this build does not know
    pub fn envelope(&self) -> Result<AuctionEnvelope, StoreError> {
        serde_json::from_value(self.body.clone()).map_err(|e| {
            StoreError::Corrupt(format!("outbox envelope {}: {}", self.envelope_id, e))
        })
    }
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Oldest undelivered records first, at most `limit`
    async fn fetch_undelivered(&self, limit: i64) -> Result<Vec<OutboxRecord>, StoreError>;

    /// Flip `delivered` once; marking an already delivered record is a no-op
    async fn mark_delivered(&self, envelope_id: Uuid) -> Result<(), StoreError>;

    async fn record_failed_attempt(&self, envelope_id: Uuid, error: &str)
        -> Result<(), StoreError>;

    /// Drop delivered records older than `older_than`; returns how many
    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait AuctionStore: OutboxStore {
    async fn get(&self, id: Uuid) -> Result<Option<Auction>, StoreError>;

    /// Apply `change` and append `envelope` to the outbox, or do neither
    async fn commit(
        &self,
        change: &StateChange,
        envelope: &AuctionEnvelope,
    ) -> Result<(), StoreError>;
}

/// Postgres-backed store; one transaction per commit
#[derive(Debug, Clone)]
pub struct PgAuctionStore {
    pool: PgPool,
}

impl PgAuctionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl OutboxStore for PgAuctionStore {
    async fn fetch_undelivered(&self, limit: i64) -> Result<Vec<OutboxRecord>, StoreError> {
        Ok(outbox_repo::fetch_undelivered(&self.pool, limit)
            .await?
            .into_iter()
            .map(OutboxRow::into_record)
            .collect())
    }

    async fn mark_delivered(&self, envelope_id: Uuid) -> Result<(), StoreError> {
        outbox_repo::mark_delivered(&self.pool, envelope_id).await?;
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        envelope_id: Uuid,
        error: &str,
    ) -> Result<(), StoreError> {
        outbox_repo::record_failed_attempt(&self.pool, envelope_id, error).await?;
        Ok(())
    }

    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        Ok(outbox_repo::purge_delivered(&self.pool, older_than).await?)
    }
}

#[async_trait]
impl AuctionStore for PgAuctionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Auction>, StoreError> {
        auction_repo::find(&self.pool, id)
            .await?
            .map(|row| row.into_auction())
            .transpose()
    }

    async fn commit(
        &self,
        change: &StateChange,
        envelope: &AuctionEnvelope,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        match change {
            StateChange::Insert(auction) => {
                auction_repo::insert(&mut tx, auction).await?;
            }
            StateChange::Update {
                auction,
                expected_version,
            } => {
                let rows = auction_repo::update_if_version(&mut tx, auction, *expected_version)
                    .await?;
                if rows == 0 {
                    return Err(StoreError::Conflict(format!(
                        "auction {} is no longer at version {}",
                        auction.id, expected_version
                    )));
                }
            }
            StateChange::Delete {
                id,
                expected_version,
            } => {
                let rows = auction_repo::delete_if_version(&mut tx, *id, *expected_version).await?;
                if rows == 0 {
                    return Err(StoreError::Conflict(format!(
                        "auction {} is no longer at version {}",
                        id, expected_version
                    )));
                }
            }
        }

        outbox_repo::insert(&mut tx, envelope).await?;
        tx.commit().await?;

        tracing::debug!(
            envelope_id = %envelope.envelope_id,
            aggregate_id = %envelope.aggregate_id,
            event_kind = %envelope.event_kind,
            "Auction change committed with outbox record"
        );

        Ok(())
    }
}
