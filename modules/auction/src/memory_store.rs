//! In-memory auction store for tests and local runs
//!
//! A commit works on a staged copy of the touched row and only publishes it
//! (together with the outbox record) once every step succeeded, all under a
//! single lock. Fault switches let tests break individual steps.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use auction_contracts::AuctionEnvelope;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::Auction;
use crate::mutator::StateChange;
use crate::store::{AuctionStore, OutboxRecord, OutboxStore, StoreError};

#[derive(Debug, Default)]
struct State {
    auctions: HashMap<Uuid, Auction>,
    outbox: Vec<OutboxRecord>,
    next_seq: i64,
}

#[derive(Debug, Default)]
pub struct InMemoryAuctionStore {
    state: Mutex<State>,
    fail_outbox_write: AtomicBool,
    fail_mark_delivered: AtomicU32,
    unavailable: AtomicBool,
}

impl InMemoryAuctionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every outbox insert fail until switched off
    pub fn set_fail_outbox_write(&self, fail: bool) {
        self.fail_outbox_write.store(fail, Ordering::SeqCst);
    }

    /// Fail the next `times` calls to `mark_delivered`
    pub fn fail_mark_delivered(&self, times: u32) {
        self.fail_mark_delivered.store(times, Ordering::SeqCst);
    }

    /// Simulate losing the database entirely
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Every outbox record, delivered or not, in insertion order
    pub async fn outbox_records(&self) -> Vec<OutboxRecord> {
        self.state.lock().await.outbox.clone()
    }

    pub async fn auction_count(&self) -> usize {
        self.state.lock().await.auctions.len()
    }

    /// Append an outbox row with an arbitrary body, bypassing the command path
    pub async fn push_raw_outbox(
        &self,
        aggregate_id: &str,
        event_kind: &str,
        body: serde_json::Value,
    ) -> Uuid {
        let mut state = self.state.lock().await;
        state.next_seq += 1;
        let envelope_id = Uuid::new_v4();
        let record = OutboxRecord {
            seq: state.next_seq,
            envelope_id,
            aggregate_id: aggregate_id.to_string(),
            event_kind: event_kind.to_string(),
            body,
            delivered: false,
            attempt_count: 0,
            created_at: Utc::now(),
            delivered_at: None,
            last_error: None,
        };
        state.outbox.push(record);
        envelope_id
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl OutboxStore for InMemoryAuctionStore {
    async fn fetch_undelivered(&self, limit: i64) -> Result<Vec<OutboxRecord>, StoreError> {
        self.check_available()?;
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .iter()
            .filter(|r| !r.delivered)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn mark_delivered(&self, envelope_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;

        let remaining = self.fail_mark_delivered.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_mark_delivered.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable(
                "mark_delivered failed (injected)".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        if let Some(record) = state
            .outbox
            .iter_mut()
            .find(|r| r.envelope_id == envelope_id && !r.delivered)
        {
            record.delivered = true;
            record.delivered_at = Some(Utc::now());
            record.attempt_count += 1;
        }
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        envelope_id: Uuid,
        error: &str,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        if let Some(record) = state
            .outbox
            .iter_mut()
            .find(|r| r.envelope_id == envelope_id)
        {
            record.attempt_count += 1;
            record.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn purge_delivered(&self, older_than: DateTime<Utc>) -> Result<u64, StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|r| !(r.delivered && r.delivered_at.is_some_and(|at| at < older_than)));
        Ok((before - state.outbox.len()) as u64)
    }
}

#[async_trait]
impl AuctionStore for InMemoryAuctionStore {
    async fn get(&self, id: Uuid) -> Result<Option<Auction>, StoreError> {
        self.check_available()?;
        Ok(self.state.lock().await.auctions.get(&id).cloned())
    }

    async fn commit(
        &self,
        change: &StateChange,
        envelope: &AuctionEnvelope,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut state = self.state.lock().await;

        let id = change.auction_id();
        let stored_version = state.auctions.get(&id).map(|a| a.version);

        let staged: Option<Auction> = match change {
            StateChange::Insert(auction) => {
                if stored_version.is_some() {
                    return Err(StoreError::Conflict(format!("auction {} already exists", id)));
                }
                Some(auction.clone())
            }
            StateChange::Update {
                auction,
                expected_version,
            } => {
                if stored_version != Some(*expected_version) {
                    return Err(StoreError::Conflict(format!(
                        "auction {} is no longer at version {}",
                        id, expected_version
                    )));
                }
                Some(auction.clone())
            }
            StateChange::Delete {
                expected_version, ..
            } => {
                if stored_version != Some(*expected_version) {
                    return Err(StoreError::Conflict(format!(
                        "auction {} is no longer at version {}",
                        id, expected_version
                    )));
                }
                None
            }
        };

        if self.fail_outbox_write.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "outbox write failed (injected)".to_string(),
            ));
        }

        // Both writes succeed once the record is built
        let record = OutboxRecord::pending(state.next_seq + 1, envelope, Utc::now())?;
        state.next_seq += 1;
        state.outbox.push(record);

        match staged {
            Some(auction) => {
                state.auctions.insert(id, auction);
            }
            None => {
                state.auctions.remove(&id);
            }
        }

        Ok(())
    }
}
