//! # Event Envelope
//!
//! Platform-wide envelope for every domain fact that crosses a service
//! boundary through the outbox.
//!
//! ## Envelope Fields
//!
//! - `envelope_id`: Unique identifier, the idempotency key on the consumer side
//! - `aggregate_id`: Entity the event describes; used as the bus partition key
//! - `event_kind`: Wire name of the payload variant (e.g. `created`)
//! - `occurred_at`: When the state change happened, monotonic per aggregate
//! - `source_module`: Module that produced the event
//! - `source_version`: Semantic version of the source module
//! - `correlation_id`: Links related events in a business transaction
//! - `causation_id`: Links this event to the command/event that caused it
//! - `payload`: Complete snapshot of the change (generic type parameter)
//!
//! An envelope is immutable once written to an outbox. Nothing in this crate
//! hands out `&mut` access after construction; the builder methods consume
//! `self`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A payload that knows which event kind it represents.
///
/// Implemented by the closed event sum types of each bounded context so the
/// envelope's `event_kind` is always derived from the payload, never typed by
/// hand.
pub trait DomainEvent {
    /// Stable wire name of this event kind (used in subjects and storage).
    fn event_kind(&self) -> &'static str;
}

/// Standard event envelope following the platform event contract
///
/// # Examples
///
/// ```rust
/// use event_bus::{DomainEvent, EventEnvelope};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct LotOpened {
///     lot_id: String,
/// }
///
/// impl DomainEvent for LotOpened {
///     fn event_kind(&self) -> &'static str {
///         "opened"
///     }
/// }
///
/// let envelope = EventEnvelope::new(
///     "lot-1".to_string(),
///     "auction".to_string(),
///     LotOpened { lot_id: "lot-1".to_string() },
/// )
/// .with_correlation_id(Some("correlation-456".to_string()));
///
/// assert_eq!(envelope.event_kind, "opened");
/// assert_eq!(envelope.subject("auction"), "auction.events.opened");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope<T> {
    /// Unique envelope identifier (idempotency key)
    pub envelope_id: Uuid,

    /// Aggregate the event describes (partition key)
    pub aggregate_id: String,

    /// Wire name of the payload variant
    pub event_kind: String,

    /// Timestamp of the state change
    pub occurred_at: DateTime<Utc>,

    /// Module that generated the event (e.g., "auction")
    pub source_module: String,

    /// Semantic version of the source module
    pub source_version: String,

    /// Links related events in a business transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Links this event to the command/event that caused it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub causation_id: Option<String>,

    /// Event-specific payload
    pub payload: T,
}

impl<T: DomainEvent> EventEnvelope<T> {
    /// Create a new envelope with a fresh `envelope_id` and `occurred_at = now`
    ///
    /// The source_version defaults to "1.0.0"; producers should override it
    /// with their own `CARGO_PKG_VERSION`.
    pub fn new(aggregate_id: String, source_module: String, payload: T) -> Self {
        Self::with_envelope_id(Uuid::new_v4(), aggregate_id, source_module, payload)
    }

    /// Create an envelope with an explicit envelope_id (useful for testing)
    pub fn with_envelope_id(
        envelope_id: Uuid,
        aggregate_id: String,
        source_module: String,
        payload: T,
    ) -> Self {
        Self {
            envelope_id,
            aggregate_id,
            event_kind: payload.event_kind().to_string(),
            occurred_at: Utc::now(),
            source_module,
            source_version: "1.0.0".to_string(),
            correlation_id: None,
            causation_id: None,
            payload,
        }
    }
}

impl<T> EventEnvelope<T> {
    /// Set the time the state change occurred
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }

    /// Set the source version
    pub fn with_source_version(mut self, version: String) -> Self {
        self.source_version = version;
        self
    }

    /// Set the correlation ID
    pub fn with_correlation_id(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    /// Set the causation ID
    pub fn with_causation_id(mut self, causation_id: Option<String>) -> Self {
        self.causation_id = causation_id;
        self
    }

    /// Bus subject for this envelope: `<module>.events.<event_kind>`
    pub fn subject(&self, module: &str) -> String {
        format!("{}.events.{}", module, self.event_kind)
    }
}

/// Validate a raw envelope before it is deserialized into a typed payload
///
/// # Validation Rules
///
/// - `envelope_id`: Must be a valid UUID
/// - `aggregate_id`: Must be non-empty
/// - `event_kind`: Must be non-empty
/// - `occurred_at`: Must be an RFC 3339 timestamp
/// - `source_module`: Must be non-empty
/// - `source_version`: Must be non-empty
/// - `payload`: Must be an object
///
/// # Errors
///
/// Returns a descriptive error string if validation fails
pub fn validate_envelope_fields(envelope: &serde_json::Value) -> Result<(), String> {
    let envelope_id = envelope
        .get("envelope_id")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid envelope_id")?;

    Uuid::parse_str(envelope_id)
        .map_err(|_| format!("Invalid envelope_id: must be a valid UUID, got '{}'", envelope_id))?;

    for field in ["aggregate_id", "event_kind", "source_module", "source_version"] {
        let value = envelope
            .get(field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("Missing or invalid {}", field))?;

        if value.trim().is_empty() {
            return Err(format!("{} cannot be empty", field));
        }
    }

    let occurred_at = envelope
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .ok_or("Missing or invalid occurred_at")?;

    DateTime::parse_from_rfc3339(occurred_at).map_err(|_| {
        format!(
            "Invalid occurred_at: must be RFC 3339 timestamp, got '{}'",
            occurred_at
        )
    })?;

    if !envelope.get("payload").is_some_and(|p| p.is_object()) {
        return Err("Missing payload or payload is not an object".to_string());
    }

    // correlation_id and causation_id are optional
    Ok(())
}

/// Pull the envelope_id out of a raw message without trusting the rest of it
///
/// Used on failure paths (dead-lettering, logging) where the envelope may be
/// malformed.
pub fn extract_envelope_id(envelope: &serde_json::Value) -> Option<Uuid> {
    envelope
        .get("envelope_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}
