//! Projection consumer runtime
//!
//! Subscribes to every auction event and fans messages out to a fixed set
//! of lanes by partition key. A lane handles its messages one at a time, so
//! envelopes of one auction are applied in delivery order while different
//! auctions proceed in parallel.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use auction_contracts::{AuctionEnvelope, AUCTION_EVENTS_PATTERN};
use event_bus::consumer_retry::{RetryConfig, Retryable};
use event_bus::{
    validate_envelope_fields, BusError, BusMessage, DeliveryState, Disposition, EventBus,
};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::dlq::dead_letter_message;
use crate::error::ApplyError;
use crate::store::{ApplyOutcome, ProjectionStore};

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Ledger namespace; two consumers with different ids each apply everything
    pub consumer_id: String,
    pub lanes: usize,
    /// Buffered messages per lane before the dispatcher waits
    pub lane_capacity: usize,
    pub apply_timeout: Duration,
    /// `max_attempts` bounds retries of transient failures
    pub retry: RetryConfig,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            consumer_id: "search-projection".to_string(),
            lanes: 8,
            lane_capacity: 256,
            apply_timeout: Duration::from_secs(5),
            retry: RetryConfig {
                max_attempts: 5,
                ..RetryConfig::default()
            },
        }
    }
}

pub struct ProjectionConsumer<S: ?Sized> {
    store: Arc<S>,
    config: ConsumerConfig,
}

impl<S: ProjectionStore + ?Sized> ProjectionConsumer<S> {
    pub fn new(store: Arc<S>, config: ConsumerConfig) -> Self {
        Self { store, config }
    }

    /// One delivery attempt, reported the way a broker expects
    pub async fn on_message(&self, msg: &BusMessage) -> Disposition {
        match self.attempt(msg).await {
            Ok(_) => Disposition::Ack,
            Err(e) => Disposition::Nack {
                retryable: e.is_retryable(),
            },
        }
    }

    /// Drive a message to a terminal state
    ///
    /// Transient failures are retried with exponential backoff up to
    /// `retry.max_attempts`; semantic failures and exhausted retries end in
    /// the dead-letter table. Returns `Applied` or `DeadLettered`, the latter
    /// only once the dead-letter record is stored.
    pub async fn process_message(&self, msg: &BusMessage) -> DeliveryState {
        let max_attempts = self.config.retry.max_attempts;
        let mut state = DeliveryState::Delivered;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            let err = match self.attempt(msg).await {
                Ok(outcome) => {
                    log_outcome(msg, outcome);
                    return state.on_applied();
                }
                Err(err) => err,
            };

            state = state.on_failure(err.is_retryable(), max_attempts);
            match state {
                DeliveryState::Retrying { failed_attempts } => {
                    let backoff = self.config.retry.backoff_for(failed_attempts);
                    tracing::warn!(
                        subject = %msg.subject,
                        partition_key = ?msg.partition_key,
                        attempt = attempts,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Projection apply failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                DeliveryState::DeadLettered => {
                    self.park(msg, &err, attempts).await;
                    return state;
                }
                other => return other,
            }
        }
    }

    /// Write the dead letter, retrying until it is stored
    ///
    /// Holds the lane meanwhile: later envelopes of the same auction must not
    /// overtake one that is neither applied nor parked.
    async fn park(&self, msg: &BusMessage, err: &ApplyError, attempts: u32) {
        let mut failed_writes: u32 = 0;
        while let Err(write_err) = dead_letter_message(
            self.store.as_ref(),
            &self.config.consumer_id,
            msg,
            err,
            attempts,
        )
        .await
        {
            failed_writes += 1;
            let backoff = self.config.retry.backoff_for(failed_writes);
            tracing::error!(
                subject = %msg.subject,
                partition_key = ?msg.partition_key,
                failed_writes,
                backoff_ms = backoff.as_millis() as u64,
                error = %write_err,
                "Dead-letter write failed, holding lane"
            );
            tokio::time::sleep(backoff).await;
        }
    }

    async fn attempt(&self, msg: &BusMessage) -> Result<ApplyOutcome, ApplyError> {
        let envelope = decode(msg)?;
        let timeout = self.config.apply_timeout;

        tokio::time::timeout(timeout, self.store.apply(&self.config.consumer_id, &envelope))
            .await
            .map_err(|_| ApplyError::Timeout(timeout))?
    }
}

/// Parse and sanity-check a bus message into a typed envelope
pub fn decode(msg: &BusMessage) -> Result<AuctionEnvelope, ApplyError> {
    let value: serde_json::Value = serde_json::from_slice(&msg.payload)
        .map_err(|e| ApplyError::Malformed(format!("payload is not JSON: {}", e)))?;

    validate_envelope_fields(&value).map_err(ApplyError::Malformed)?;

    let envelope: AuctionEnvelope = serde_json::from_value(value)
        .map_err(|e| ApplyError::Malformed(format!("unrecognized envelope: {}", e)))?;

    if let Some(message_id) = &msg.message_id {
        if *message_id != envelope.envelope_id.to_string() {
            return Err(ApplyError::Malformed(format!(
                "message id {} does not match envelope {}",
                message_id, envelope.envelope_id
            )));
        }
    }

    Ok(envelope)
}

fn log_outcome(msg: &BusMessage, outcome: ApplyOutcome) {
    match outcome {
        ApplyOutcome::Applied => tracing::info!(
            subject = %msg.subject,
            partition_key = ?msg.partition_key,
            "Envelope applied"
        ),
        ApplyOutcome::Duplicate => tracing::info!(
            subject = %msg.subject,
            partition_key = ?msg.partition_key,
            "Duplicate envelope, already applied"
        ),
        ApplyOutcome::Skipped(reason) => tracing::warn!(
            subject = %msg.subject,
            partition_key = ?msg.partition_key,
            reason = reason.as_str(),
            "Envelope left the projection unchanged"
        ),
    }
}

/// Lane index for an ordering key; stable for the life of the process
pub fn lane_for(key: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % lanes.max(1) as u64) as usize
}

/// Subscribe and start the lane workers
///
/// The subscription is in place when this returns. The returned handle is
/// the dispatcher; it ends when the bus stream ends.
pub async fn start_projection_consumer<S>(
    bus: Arc<dyn EventBus>,
    consumer: Arc<ProjectionConsumer<S>>,
) -> Result<JoinHandle<()>, BusError>
where
    S: ProjectionStore + ?Sized + 'static,
{
    let mut stream = bus.subscribe(AUCTION_EVENTS_PATTERN).await?;
    let lanes = consumer.config.lanes.max(1);

    tracing::info!(
        consumer_id = %consumer.config.consumer_id,
        pattern = AUCTION_EVENTS_PATTERN,
        lanes,
        "Projection consumer subscribed"
    );

    let mut senders = Vec::with_capacity(lanes);
    for lane in 0..lanes {
        let (tx, mut rx) = mpsc::channel::<BusMessage>(consumer.config.lane_capacity.max(1));
        senders.push(tx);

        let consumer = consumer.clone();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let span = tracing::info_span!(
                    "projection_apply",
                    consumer_id = %consumer.config.consumer_id,
                    lane,
                    subject = %msg.subject,
                    message_id = ?msg.message_id,
                );
                consumer.process_message(&msg).instrument(span).await;
            }
        });
    }

    let handle = tokio::spawn(async move {
        while let Some(msg) = stream.next().await {
            let lane = lane_for(msg.ordering_key(), lanes);
            if senders[lane].send(msg).await.is_err() {
                tracing::error!(lane, "Projection lane closed, stopping dispatcher");
                break;
            }
        }
        tracing::warn!("Projection consumer stream ended");
    });

    Ok(handle)
}
