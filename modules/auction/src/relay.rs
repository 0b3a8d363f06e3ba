//! Outbox relay
//!
//! Background task that drains undelivered outbox records to the event bus.
//! A record is marked delivered only after the bus acknowledged it, so a
//! crash in between republishes it (at-least-once). Consumers dedupe on the
//! envelope id carried as the message id.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use event_bus::consumer_retry::{retry_with_backoff, RetryConfig};
use event_bus::{BusError, BusMessage, EventBus};
use tokio::sync::watch;

use crate::store::{OutboxRecord, OutboxStore, StoreError};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub poll_interval: Duration,
    pub batch_size: i64,
    /// Upper bound on a single publish attempt
    pub publish_timeout: Duration,
    /// Per-record publish retries within one tick
    pub retry: RetryConfig,
    /// How long delivered records are kept before purging
    pub retention: chrono::Duration,
    pub purge_every_ticks: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 100,
            publish_timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            retention: chrono::Duration::days(7),
            purge_every_ticks: 60,
        }
    }
}

/// What one pass over the outbox did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub published: usize,
    pub failed: usize,
    /// Skipped because an earlier record of the same aggregate failed
    pub deferred: usize,
}

pub struct OutboxRelay<O: ?Sized> {
    store: Arc<O>,
    bus: Arc<dyn EventBus>,
    config: RelayConfig,
}

impl<O: OutboxStore + ?Sized> OutboxRelay<O> {
    pub fn new(store: Arc<O>, bus: Arc<dyn EventBus>, config: RelayConfig) -> Self {
        Self { store, bus, config }
    }

    /// Publish one batch in outbox order
    ///
    /// Once a record of an aggregate fails, the rest of that aggregate's
    /// records in this batch are deferred so they cannot overtake it. Other
    /// aggregates are unaffected.
    pub async fn relay_batch(&self) -> Result<RelayReport, StoreError> {
        let records = self.store.fetch_undelivered(self.config.batch_size).await?;
        let mut report = RelayReport::default();
        let mut blocked: HashSet<String> = HashSet::new();

        for record in &records {
            if blocked.contains(&record.aggregate_id) {
                report.deferred += 1;
                continue;
            }

            if let Err(e) = self.publish_record(record).await {
                tracing::error!(
                    envelope_id = %record.envelope_id,
                    aggregate_id = %record.aggregate_id,
                    attempt_count = record.attempt_count,
                    error = %e,
                    "Failed to publish outbox record"
                );
                report.failed += 1;
                blocked.insert(record.aggregate_id.clone());

                if let Err(store_err) = self
                    .store
                    .record_failed_attempt(record.envelope_id, &e.to_string())
                    .await
                {
                    tracing::warn!(
                        envelope_id = %record.envelope_id,
                        error = %store_err,
                        "Could not record failed publish attempt"
                    );
                }
                continue;
            }

            // Published but not marked: it will be sent again next tick
            if let Err(e) = self.store.mark_delivered(record.envelope_id).await {
                tracing::warn!(
                    envelope_id = %record.envelope_id,
                    aggregate_id = %record.aggregate_id,
                    error = %e,
                    "Published outbox record could not be marked delivered"
                );
                report.failed += 1;
                blocked.insert(record.aggregate_id.clone());
                continue;
            }

            report.published += 1;
            tracing::info!(
                envelope_id = %record.envelope_id,
                aggregate_id = %record.aggregate_id,
                event_kind = %record.event_kind,
                seq = record.seq,
                "Outbox record published"
            );
        }

        Ok(report)
    }

    async fn publish_record(&self, record: &OutboxRecord) -> Result<(), BusError> {
        let payload = serde_json::to_vec(&record.body)
            .map_err(|e| BusError::SerializationError(e.to_string()))?;

        let msg = BusMessage::new(record.subject(), payload)
            .with_partition_key(record.aggregate_id.clone())
            .with_message_id(record.envelope_id.to_string());

        let publish_timeout = self.config.publish_timeout;
        retry_with_backoff(
            || {
                let msg = msg.clone();
                async move {
                    match tokio::time::timeout(publish_timeout, self.bus.publish(msg)).await {
                        Ok(result) => result,
                        Err(_) => Err(BusError::Timeout(publish_timeout)),
                    }
                }
            },
            &self.config.retry,
            "outbox_publish",
        )
        .await
    }

    async fn purge(&self) {
        let cutoff = Utc::now() - self.config.retention;
        match self.store.purge_delivered(cutoff).await {
            Ok(0) => {}
            Ok(purged) => tracing::info!(purged, "Purged delivered outbox records"),
            Err(e) => tracing::warn!(error = %e, "Outbox purge failed"),
        }
    }

    /// Poll until `shutdown` flips to `true` (or its sender is dropped)
    ///
    /// Consecutive failing ticks stretch the wait using the retry backoff.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            batch_size = self.config.batch_size,
            "Starting outbox relay"
        );

        let purge_every = self.config.purge_every_ticks.max(1);
        let mut tick: u64 = 0;
        let mut failing_ticks: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tick += 1;

            match self.relay_batch().await {
                Ok(report) => {
                    if report.failed > 0 {
                        failing_ticks += 1;
                        tracing::warn!(
                            tick,
                            published = report.published,
                            failed = report.failed,
                            deferred = report.deferred,
                            "Relay tick finished with failures"
                        );
                    } else {
                        failing_ticks = 0;
                        if report.published > 0 {
                            tracing::info!(tick, published = report.published, "Relay tick");
                        } else if tick <= 3 || tick % 60 == 0 {
                            tracing::debug!(tick, "Relay tick: outbox empty");
                        }
                    }
                }
                Err(e) => {
                    failing_ticks += 1;
                    tracing::error!(tick, error = %e, "Relay tick could not read the outbox");
                }
            }

            if tick % purge_every == 0 {
                self.purge().await;
            }

            let wait = self.config.poll_interval + self.config.retry.backoff_for(failing_ticks);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Outbox relay stopped");
    }
}
