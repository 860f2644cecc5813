//! Queue message envelope.
//!
//! The poller serializes an [`OutboxEventMessage`] wrapped in a
//! [`QueueMessage`] envelope; the consumer deserializes it and routes to the
//! channel dispatcher. The envelope deliberately carries only references
//! (ids): the payload itself stays in the database and is loaded by the
//! dispatcher, so redeliveries always see current state.

use crate::models::{Channel, OutboxRecord};
use chrono::{DateTime, Utc};
use message_queue::Attributes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

/// Event type tags used by the notification write paths.
pub mod event_types {
    pub const EMAIL_REQUESTED: &str = "EMAIL_REQUESTED";
    pub const SMS_REQUESTED: &str = "SMS_REQUESTED";
    pub const PUSH_REQUESTED: &str = "PUSH_REQUESTED";
    pub const IN_APP_REQUESTED: &str = "IN_APP_REQUESTED";
}

/// Payload of an outbox event on the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEventMessage {
    /// Id of the outbox record.
    pub event_id: Uuid,
    /// Delivery channel, used for dispatch routing.
    pub channel: Channel,
    /// Id of the channel payload.
    pub message_id: Uuid,
    pub event_type: String,
    /// Partition key for ordering, if the transport supports it.
    pub partition_key: String,
}

impl OutboxEventMessage {
    pub fn from_record(record: &OutboxRecord) -> Self {
        Self {
            event_id: record.id,
            channel: record.channel,
            message_id: record.message_id,
            event_type: record.event_type.clone(),
            partition_key: record.partition_key.clone(),
        }
    }

    /// Transport attributes for filtering/tracing without parsing the body.
    pub fn attributes(&self) -> Attributes {
        let mut attributes = Attributes::new();
        attributes.insert("eventType".to_string(), self.event_type.clone());
        attributes.insert("channel".to_string(), self.channel.to_string());
        attributes.insert("messageId".to_string(), self.message_id.to_string());
        attributes
    }
}

/// Generic queue envelope wrapping a payload with delivery metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage<T> {
    pub message_id: Uuid,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
    pub payload: T,
}

impl<T: Serialize + DeserializeOwned> QueueMessage<T> {
    pub fn new(event_type: impl Into<String>, payload: T) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            event_type: event_type.into(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(body: &str) -> serde_json::Result<Self> {
        serde_json::from_str(body)
    }
}
