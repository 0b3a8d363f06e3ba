//! Delivery state machine for a single envelope
//!
//! ```text
//! Pending ──publish ack──▶ Delivered ──ok──▶ Applied
//!                              │
//!                              └─fail─▶ Retrying ──ok──▶ Applied
//!                                          │
//!                                          └─exhausted / poison─▶ DeadLettered
//! ```
//!
//! `Pending` and `Delivered` are tracked by the producer's outbox;
//! the remaining states belong to each consumer.

use std::fmt;

/// Where an envelope is in its journey from outbox to read model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    /// Committed to the outbox, not yet acknowledged by the bus
    Pending,
    /// Acknowledged by the bus / handed to a consumer
    Delivered,
    /// At least one apply attempt failed with a transient error
    Retrying { failed_attempts: u32 },
    /// Applied to the consumer's read model (or recognised as a duplicate)
    Applied,
    /// Parked for external remediation
    DeadLettered,
}

impl DeliveryState {
    /// The bus acknowledged the publish
    pub fn on_published(self) -> Self {
        match self {
            DeliveryState::Pending => DeliveryState::Delivered,
            other => other,
        }
    }

    /// An apply attempt succeeded
    pub fn on_applied(self) -> Self {
        match self {
            DeliveryState::Delivered | DeliveryState::Retrying { .. } => DeliveryState::Applied,
            other => other,
        }
    }

    /// An apply attempt failed
    ///
    /// Non-retryable failures dead-letter immediately; retrying cannot change
    /// a deterministic outcome. Retryable failures dead-letter once
    /// `max_attempts` attempts have been spent.
    pub fn on_failure(self, retryable: bool, max_attempts: u32) -> Self {
        let failed_attempts = match self {
            DeliveryState::Delivered => 1,
            DeliveryState::Retrying { failed_attempts } => failed_attempts + 1,
            other => return other,
        };

        if !retryable || failed_attempts >= max_attempts {
            DeliveryState::DeadLettered
        } else {
            DeliveryState::Retrying { failed_attempts }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Applied | DeliveryState::DeadLettered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::Pending => "pending",
            DeliveryState::Delivered => "delivered",
            DeliveryState::Retrying { .. } => "retrying",
            DeliveryState::Applied => "applied",
            DeliveryState::DeadLettered => "dead_lettered",
        }
    }
}

impl fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consumer verdict on one delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Ack,
    Nack { retryable: bool },
}
