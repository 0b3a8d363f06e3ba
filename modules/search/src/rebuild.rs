//! Rebuild the search projection from an ordered envelope history
//!
//! The read model is disposable: replaying the same history into an empty
//! store yields the same entries the live consumer built. Poison envelopes
//! are dead-lettered exactly as the live path would; a transient failure,
//! including a failed dead-letter write, aborts the rebuild so it can be
//! rerun from the start.

use auction_contracts::AuctionEnvelope;
use event_bus::consumer_retry::Retryable;
use event_bus::BusMessage;

use crate::dlq::dead_letter_message;
use crate::error::ApplyError;
use crate::store::{ApplyOutcome, ProjectionStore};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub applied: usize,
    pub skipped: usize,
    pub duplicates: usize,
    pub dead_lettered: usize,
}

pub async fn rebuild<S, I>(
    store: &S,
    consumer_id: &str,
    envelopes: I,
) -> Result<RebuildReport, ApplyError>
where
    S: ProjectionStore + ?Sized,
    I: IntoIterator<Item = AuctionEnvelope>,
{
    let mut report = RebuildReport::default();

    for envelope in envelopes {
        match store.apply(consumer_id, &envelope).await {
            Ok(ApplyOutcome::Applied) => report.applied += 1,
            Ok(ApplyOutcome::Skipped(_)) => report.skipped += 1,
            Ok(ApplyOutcome::Duplicate) => report.duplicates += 1,
            Err(e) if !e.is_retryable() => {
                let msg = as_message(&envelope)?;
                dead_letter_message(store, consumer_id, &msg, &e, 1).await?;
                report.dead_lettered += 1;
            }
            Err(e) => {
                tracing::error!(
                    consumer_id = %consumer_id,
                    envelope_id = %envelope.envelope_id,
                    error = %e,
                    "Rebuild aborted on transient failure"
                );
                return Err(e);
            }
        }
    }

    tracing::info!(
        consumer_id = %consumer_id,
        applied = report.applied,
        skipped = report.skipped,
        duplicates = report.duplicates,
        dead_lettered = report.dead_lettered,
        "Projection rebuild finished"
    );

    Ok(report)
}

fn as_message(envelope: &AuctionEnvelope) -> Result<BusMessage, ApplyError> {
    let payload =
        serde_json::to_vec(envelope).map_err(|e| ApplyError::Malformed(e.to_string()))?;
    Ok(BusMessage::new(envelope.subject(auction_contracts::SOURCE_MODULE), payload)
        .with_partition_key(envelope.aggregate_id.clone())
        .with_message_id(envelope.envelope_id.to_string()))
}
