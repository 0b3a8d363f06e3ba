//! Projection store
//!
//! Holds the search read model, the idempotency ledger and the dead-letter
//! table. `apply` claims the ledger row, mutates the read model and commits
//! as one unit, so a crash can never leave one without the other.

use async_trait::async_trait;
use auction_contracts::AuctionEnvelope;
use sqlx::PgPool;
use uuid::Uuid;

use crate::dlq::FailedEvent;
use crate::error::ApplyError;
use crate::models::SearchItem;
use crate::projector::{plan, NoOpReason, ProjectionChange};
use crate::repos::{failed_repo, item_repo, processed_repo};

/// Result of applying one envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Already in the ledger; nothing was touched
    Duplicate,
    /// Read model unchanged; recorded in the ledger unless the entry was
    /// missing
    Skipped(NoOpReason),
}

#[async_trait]
pub trait ProjectionStore: Send + Sync {
    /// Apply `envelope` for `consumer_id` exactly once
    ///
    /// On error nothing is written, the ledger row included.
    async fn apply(
        &self,
        consumer_id: &str,
        envelope: &AuctionEnvelope,
    ) -> Result<ApplyOutcome, ApplyError>;

    async fn get(&self, id: Uuid) -> Result<Option<SearchItem>, ApplyError>;

    /// Every entry, ordered by auction end then id
    async fn list(&self) -> Result<Vec<SearchItem>, ApplyError>;

    async fn is_processed(&self, consumer_id: &str, envelope_id: Uuid)
        -> Result<bool, ApplyError>;

    async fn dead_letter(&self, failed: &FailedEvent) -> Result<(), ApplyError>;

    async fn dead_letters(&self, consumer_id: &str) -> Result<Vec<FailedEvent>, ApplyError>;
}

/// Outcome reported for a planned change once it is committed
pub(crate) fn outcome_of(change: &ProjectionChange) -> ApplyOutcome {
    match change {
        ProjectionChange::NoOp(reason) => ApplyOutcome::Skipped(*reason),
        _ => ApplyOutcome::Applied,
    }
}

#[derive(Debug, Clone)]
pub struct PgProjectionStore {
    pool: PgPool,
}

impl PgProjectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl ProjectionStore for PgProjectionStore {
    async fn apply(
        &self,
        consumer_id: &str,
        envelope: &AuctionEnvelope,
    ) -> Result<ApplyOutcome, ApplyError> {
        let mut tx = self.pool.begin().await?;

        let claimed = processed_repo::try_claim(
            &mut tx,
            consumer_id,
            envelope.envelope_id,
            &envelope.event_kind,
        )
        .await?;
        if !claimed {
            tx.rollback().await?;
            return Ok(ApplyOutcome::Duplicate);
        }

        let target = envelope.payload.auction_id();
        let current = item_repo::find_for_update(&mut tx, target)
            .await?
            .map(|row| row.into_item())
            .transpose()?;

        // Dropping the transaction on error rolls back the ledger claim
        let change = plan(envelope, current.as_ref())?;
        if !change.settles_envelope() {
            tx.rollback().await?;
            return Ok(outcome_of(&change));
        }

        match &change {
            ProjectionChange::Insert(item) | ProjectionChange::Replace(item) => {
                item_repo::upsert(&mut tx, item).await?;
            }
            ProjectionChange::Remove(id) => {
                item_repo::delete(&mut tx, *id).await?;
            }
            ProjectionChange::NoOp(_) => {}
        }

        tx.commit().await?;
        Ok(outcome_of(&change))
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchItem>, ApplyError> {
        item_repo::find(&self.pool, id)
            .await?
            .map(|row| row.into_item())
            .transpose()
    }

    async fn list(&self) -> Result<Vec<SearchItem>, ApplyError> {
        item_repo::list(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.into_item())
            .collect()
    }

    async fn is_processed(
        &self,
        consumer_id: &str,
        envelope_id: Uuid,
    ) -> Result<bool, ApplyError> {
        Ok(processed_repo::exists(&self.pool, consumer_id, envelope_id).await?)
    }

    async fn dead_letter(&self, failed: &FailedEvent) -> Result<(), ApplyError> {
        failed_repo::insert(&self.pool, failed).await?;
        Ok(())
    }

    async fn dead_letters(&self, consumer_id: &str) -> Result<Vec<FailedEvent>, ApplyError> {
        Ok(failed_repo::list_for_consumer(&self.pool, consumer_id)
            .await?
            .into_iter()
            .map(FailedEvent::from)
            .collect())
    }
}
