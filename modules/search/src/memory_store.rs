//! In-memory projection store for tests, local runs and dry-run rebuilds

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use auction_contracts::AuctionEnvelope;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dlq::FailedEvent;
use crate::error::ApplyError;
use crate::models::SearchItem;
use crate::projector::{plan, ProjectionChange};
use crate::store::{outcome_of, ApplyOutcome, ProjectionStore};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<Uuid, SearchItem>,
    ledger: HashSet<(String, Uuid)>,
    dead_letters: Vec<FailedEvent>,
}

#[derive(Debug, Default)]
pub struct InMemoryProjectionStore {
    state: Mutex<State>,
    transient_failures: AtomicU32,
    unavailable: AtomicBool,
    apply_delay_ms: AtomicU32,
}

impl InMemoryProjectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` applies with a storage error
    pub fn fail_next_applies(&self, times: u32) {
        self.transient_failures.store(times, Ordering::SeqCst);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stall every apply before it touches any state
    pub fn set_apply_delay(&self, delay: Duration) {
        self.apply_delay_ms
            .store(delay.as_millis() as u32, Ordering::SeqCst);
    }

    pub async fn ledger_len(&self) -> usize {
        self.state.lock().await.ledger.len()
    }

    fn check_faults(&self) -> Result<(), ApplyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ApplyError::Unavailable(
                "in-memory projection store offline".to_string(),
            ));
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ApplyError::Storage("injected write failure".to_string()));
        }

        Ok(())
    }
}

#[async_trait]
impl ProjectionStore for InMemoryProjectionStore {
    async fn apply(
        &self,
        consumer_id: &str,
        envelope: &AuctionEnvelope,
    ) -> Result<ApplyOutcome, ApplyError> {
        let delay = self.apply_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.check_faults()?;

        let mut state = self.state.lock().await;
        let key = (consumer_id.to_string(), envelope.envelope_id);
        if state.ledger.contains(&key) {
            return Ok(ApplyOutcome::Duplicate);
        }

        let target = envelope.payload.auction_id();
        let change = plan(envelope, state.items.get(&target))?;

        match &change {
            ProjectionChange::Insert(item) | ProjectionChange::Replace(item) => {
                state.items.insert(item.id, item.clone());
            }
            ProjectionChange::Remove(id) => {
                state.items.remove(id);
            }
            ProjectionChange::NoOp(_) => {}
        }
        if change.settles_envelope() {
            state.ledger.insert(key);
        }

        Ok(outcome_of(&change))
    }

    async fn get(&self, id: Uuid) -> Result<Option<SearchItem>, ApplyError> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<SearchItem>, ApplyError> {
        let mut items: Vec<SearchItem> = self.state.lock().await.items.values().cloned().collect();
        items.sort_by(|a, b| a.auction_end.cmp(&b.auction_end).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn is_processed(
        &self,
        consumer_id: &str,
        envelope_id: Uuid,
    ) -> Result<bool, ApplyError> {
        Ok(self
            .state
            .lock()
            .await
            .ledger
            .contains(&(consumer_id.to_string(), envelope_id)))
    }

    async fn dead_letter(&self, failed: &FailedEvent) -> Result<(), ApplyError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ApplyError::Unavailable(
                "in-memory projection store offline".to_string(),
            ));
        }
        self.state.lock().await.dead_letters.push(failed.clone());
        Ok(())
    }

    async fn dead_letters(&self, consumer_id: &str) -> Result<Vec<FailedEvent>, ApplyError> {
        Ok(self
            .state
            .lock()
            .await
            .dead_letters
            .iter()
            .filter(|f| f.consumer_id == consumer_id)
            .cloned()
            .collect())
    }
}
