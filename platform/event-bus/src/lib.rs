//! # EventBus Abstraction
//!
//! Shared messaging capability for the auction platform: the producer-side
//! outbox relay publishes through it, downstream projections subscribe
//! through it.
//!
//! ## Implementations
//!
//! - **NatsBus**: Production implementation using NATS
//! - **InMemoryBus**: Test/dev implementation using in-memory channels
//!
//! ## Contract expected of a bus
//!
//! - Messages published with the same partition key are delivered in
//!   publish order
//! - Delivery is at-least-once; consumers dedupe on the envelope id carried
//!   as the message id
//! - Nothing is guaranteed across partition keys
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{BusMessage, EventBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! let mut stream = bus.subscribe("auction.events.>").await?;
//!
//! let msg = BusMessage::new("auction.events.created".to_string(), b"{}".to_vec())
//!     .with_partition_key("auction-1".to_string());
//! bus.publish(msg).await?;
//!
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("Received: {} bytes on {}", msg.payload.len(), msg.subject);
//! }
//! # Ok(())
//! # }
//! ```

pub mod consumer_retry;
mod delivery;
mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use delivery::{DeliveryState, Disposition};
pub use envelope::{extract_envelope_id, validate_envelope_fields, DomainEvent, EventEnvelope};
pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Header carrying the partition key on transports without native partitions
pub const PARTITION_KEY_HEADER: &str = "Partition-Key";

/// Header carrying the message id (JetStream uses it for publish dedupe)
pub const MESSAGE_ID_HEADER: &str = "Nats-Msg-Id";

/// A message travelling over the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/topic this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Ordering key; messages sharing it are delivered in publish order
    pub partition_key: Option<String>,
    /// Stable identity of the message (the envelope id)
    pub message_id: Option<String>,
    /// Optional transport headers
    pub headers: Option<HashMap<String, String>>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            partition_key: None,
            message_id: None,
            headers: None,
        }
    }

    /// Route the message by partition key
    pub fn with_partition_key(mut self, partition_key: String) -> Self {
        self.partition_key = Some(partition_key);
        self
    }

    /// Attach a stable message id
    pub fn with_message_id(mut self, message_id: String) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Key used to keep per-aggregate ordering on the consumer side
    ///
    /// Falls back to the subject when the producer did not set a partition
    /// key, which serializes everything on that subject.
    pub fn ordering_key(&self) -> &str {
        self.partition_key.as_deref().unwrap_or(&self.subject)
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject pattern: {0}")]
    InvalidSubject(String),

    #[error("publish timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core event bus abstraction for publish-subscribe messaging
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message
    ///
    /// # Returns
    /// * `Ok(())` once the transport acknowledged the message
    /// * `Err(BusError)` if publishing failed; the caller still owns the
    ///   record and must retry
    async fn publish(&self, msg: BusMessage) -> BusResult<()>;

    /// Subscribe to messages matching a subject pattern
    ///
    /// * `subject` - The subject pattern to subscribe to (supports wildcards: `*`, `>`)
    ///   - `*` matches a single token (e.g., `auction.*.created`)
    ///   - `>` matches one or more tokens (e.g., `auction.events.>`)
    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}

/// Which bus implementation a service should run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    /// Parse a `BUS_TYPE` value (`nats` or `inmemory`, case-insensitive)
    pub fn parse(value: &str) -> Result<Self, String> {
        match value.to_lowercase().as_str() {
            "nats" => Ok(BusType::Nats),
            "inmemory" => Ok(BusType::InMemory),
            other => Err(format!(
                "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
                other
            )),
        }
    }
}

/// Build the configured bus
pub async fn connect_bus(bus_type: &BusType, nats_url: &str) -> BusResult<Arc<dyn EventBus>> {
    match bus_type {
        BusType::InMemory => {
            tracing::info!("Using InMemory event bus");
            Ok(Arc::new(InMemoryBus::new()))
        }
        BusType::Nats => {
            tracing::info!("Connecting to NATS at {}", nats_url);
            let client = async_nats::connect(nats_url)
                .await
                .map_err(|e| BusError::ConnectionError(e.to_string()))?;
            Ok(Arc::new(NatsBus::new(client)))
        }
    }
}
