//! Dead-letter records
//!
//! A dead-lettered envelope is kept verbatim with enough routing context to
//! replay it once the cause is fixed. It is never written to the idempotency
//! ledger, so a replay applies normally.

use chrono::{DateTime, Utc};
use event_bus::{extract_envelope_id, BusMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ApplyError;
use crate::store::ProjectionStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEvent {
    pub consumer_id: String,
    /// Absent when the payload was too broken to carry one
    pub envelope_id: Option<Uuid>,
    pub subject: String,
    pub partition_key: Option<String>,
    pub envelope_json: Value,
    pub error: String,
    pub attempts: i32,
    pub failed_at: DateTime<Utc>,
}

impl FailedEvent {
    pub fn from_message(
        consumer_id: &str,
        msg: &BusMessage,
        error: &ApplyError,
        attempts: u32,
    ) -> Self {
        // Keep unparseable payloads as a JSON string so nothing is lost
        let envelope_json = serde_json::from_slice::<Value>(&msg.payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&msg.payload).into_owned()));

        Self {
            consumer_id: consumer_id.to_string(),
            envelope_id: extract_envelope_id(&envelope_json),
            subject: msg.subject.clone(),
            partition_key: msg.partition_key.clone(),
            envelope_json,
            error: error.to_string(),
            attempts: attempts as i32,
            failed_at: Utc::now(),
        }
    }
}

/// Park a message in the dead-letter table
///
/// One write attempt. The caller decides what a failed write means: the
/// live consumer keeps retrying, a rebuild stops.
pub async fn dead_letter_message<S: ProjectionStore + ?Sized>(
    store: &S,
    consumer_id: &str,
    msg: &BusMessage,
    error: &ApplyError,
    attempts: u32,
) -> Result<(), ApplyError> {
    let failed = FailedEvent::from_message(consumer_id, msg, error, attempts);
    store.dead_letter(&failed).await?;

    tracing::error!(
        consumer_id = %consumer_id,
        envelope_id = ?failed.envelope_id,
        subject = %msg.subject,
        partition_key = ?msg.partition_key,
        attempts,
        error = %error,
        "Envelope moved to dead-letter table"
    );

    Ok(())
}
