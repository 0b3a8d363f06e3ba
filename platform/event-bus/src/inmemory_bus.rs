//! In-memory implementation of the EventBus trait for testing and development

use crate::{BusMessage, BusResult, EventBus};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;

/// EventBus implementation using an in-process broadcast channel
///
/// Suitable for unit tests, local development and single-process demos.
/// A single channel carries every message, so delivery order equals publish
/// order for all partition keys. Subscribers that fall more than the buffer
/// size behind lose messages; the outbox relay is what makes that
/// recoverable in a real deployment, not this bus.
///
/// # Example
/// ```rust
/// use event_bus::{BusMessage, EventBus, InMemoryBus};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = InMemoryBus::new();
///
/// // Subscribe before publishing
/// let mut stream = bus.subscribe("auction.events.>").await?;
///
/// bus.publish(BusMessage::new("auction.events.created".to_string(), b"hello".to_vec()))
///     .await?;
///
/// let msg = stream.next().await.unwrap();
/// assert_eq!(msg.subject, "auction.events.created");
/// assert_eq!(msg.payload, b"hello");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryBus {
    sender: Arc<broadcast::Sender<BusMessage>>,
}

impl InMemoryBus {
    /// Create a new in-memory event bus with a buffer of 1000 messages
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    /// Create a new in-memory event bus with a custom buffer size
    pub fn with_capacity(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Check if a subject matches a subscription pattern
    ///
    /// Supports NATS-style wildcards:
    /// - `*` matches exactly one token
    /// - `>` matches one or more tokens
    fn matches_pattern(subject: &str, pattern: &str) -> bool {
        let subject_tokens: Vec<&str> = subject.split('.').collect();
        let pattern_tokens: Vec<&str> = pattern.split('.').collect();

        for (idx, pattern_token) in pattern_tokens.iter().enumerate() {
            match *pattern_token {
                ">" => return idx < subject_tokens.len(),
                "*" if idx < subject_tokens.len() => continue,
                token if subject_tokens.get(idx) == Some(&token) => continue,
                _ => return false,
            }
        }

        subject_tokens.len() == pattern_tokens.len()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryBus {
    async fn publish(&self, msg: BusMessage) -> BusResult<()> {
        // No receivers is not an error: nobody is listening yet
        let _ = self.sender.send(msg);
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(msg) => {
                        if Self::matches_pattern(&msg.subject, &pattern) {
                            yield msg;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(
                            pattern = %pattern,
                            skipped = skipped,
                            "InMemoryBus subscriber lagged, messages dropped"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(stream.boxed())
    }
}
