//! NATS-based implementation of the EventBus trait

use crate::{BusError, BusMessage, BusResult, EventBus, MESSAGE_ID_HEADER, PARTITION_KEY_HEADER};
use async_nats::{Client, HeaderMap};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use std::collections::HashMap;

/// EventBus implementation on top of a NATS connection
///
/// NATS preserves publish order per connection, which is what gives the
/// outbox relay its per-aggregate ordering. The partition key and message
/// id travel as headers so consumers can route and dedupe without parsing
/// the payload.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{BusMessage, EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client);
///
/// bus.publish(BusMessage::new("auction.events.created".to_string(), b"{}".to_vec()))
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Create a new NatsBus from an already-connected client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn outbound_headers(msg: &BusMessage) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(extra) = &msg.headers {
            for (key, value) in extra {
                headers.insert(key.as_str(), value.as_str());
            }
        }
        if let Some(key) = &msg.partition_key {
            headers.insert(PARTITION_KEY_HEADER, key.as_str());
        }
        if let Some(id) = &msg.message_id {
            headers.insert(MESSAGE_ID_HEADER, id.as_str());
        }
        headers
    }
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish(&self, msg: BusMessage) -> BusResult<()> {
        let headers = Self::outbound_headers(&msg);

        self.client
            .publish_with_headers(msg.subject, headers, msg.payload.into())
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        // Flush so "Ok" means the server has the bytes, not just our buffer
        self.client
            .flush()
            .await
            .map_err(|e| BusError::PublishError(e.to_string()))?;

        Ok(())
    }

    async fn subscribe(&self, subject: &str) -> BusResult<BoxStream<'static, BusMessage>> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        let stream = subscriber.map(|nats_msg| {
            let mut msg = BusMessage::new(nats_msg.subject.to_string(), nats_msg.payload.to_vec());

            if let Some(nats_headers) = nats_msg.headers {
                let mut headers = HashMap::new();
                for (key, values) in nats_headers.iter() {
                    if let Some(value) = values.first() {
                        headers.insert(key.to_string(), value.to_string());
                    }
                }

                msg.partition_key = headers.get(PARTITION_KEY_HEADER).cloned();
                msg.message_id = headers.get(MESSAGE_ID_HEADER).cloned();

                if !headers.is_empty() {
                    msg = msg.with_headers(headers);
                }
            }

            msg
        });

        Ok(stream.boxed())
    }
}
