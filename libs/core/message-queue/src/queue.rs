//! Queue traits and message types

use crate::error::QueueError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Message attributes carried alongside the body for transport-level
/// filtering and tracing.
pub type Attributes = HashMap<String, String>;

/// Producer side of the queue.
///
/// Implementations provide at-least-once delivery: a message handed to
/// `send` may reach the consumer more than once, and consumers must be
/// idempotent. No ordering is guaranteed across partitions.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Send a message to a destination.
    ///
    /// Returns the transport-assigned message id.
    async fn send(
        &self,
        destination: &str,
        body: &str,
        attributes: &Attributes,
    ) -> Result<String, QueueError>;

    /// Send a message that becomes visible to consumers only after `delay`.
    async fn send_with_delay(
        &self,
        destination: &str,
        body: &str,
        delay: Duration,
        attributes: &Attributes,
    ) -> Result<String, QueueError>;

    /// Check whether the destination is reachable and accepting messages.
    async fn is_healthy(&self, destination: &str) -> bool;
}

/// A message as delivered to a consumer.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    /// Transport message id, used to acknowledge the message.
    pub transport_id: String,

    /// The message body.
    pub body: String,

    /// Message attributes set by the producer.
    pub attributes: Attributes,

    /// Number of times this message has been delivered (1 = first delivery).
    pub delivery_count: u32,
}

impl ReceivedMessage {
    /// Whether this delivery is a redelivery of an unacknowledged message.
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Consumer side of the queue, bound to one destination.
///
/// A message that is received but never acknowledged is redelivered after
/// the transport's visibility timeout, possibly to another consumer
/// instance.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Receive up to `max_messages`, waiting at most `wait` for the first.
    ///
    /// An empty batch is normal and not an error.
    async fn receive(
        &self,
        max_messages: usize,
        wait: Duration,
    ) -> Result<Vec<ReceivedMessage>, QueueError>;

    /// Acknowledge (delete) a message so it is never redelivered.
    async fn ack(&self, transport_id: &str) -> Result<(), QueueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redelivery_flag() {
        let first = ReceivedMessage {
            transport_id: "1-0".to_string(),
            body: "{}".to_string(),
            attributes: Attributes::new(),
            delivery_count: 1,
        };
        assert!(!first.is_redelivery());

        let again = ReceivedMessage {
            delivery_count: 3,
            ..first
        };
        assert!(again.is_redelivery());
    }
}
