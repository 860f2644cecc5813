//! Outbox publisher.
//!
//! Records the durable intent to deliver a notification. The insert MUST
//! happen in the same transaction as the business write that created the
//! channel payload, which is why `publish` takes a `&DatabaseTransaction`
//! rather than a connection: calling it outside a transaction is a compile
//! error, the Rust rendering of mandatory transaction propagation.
//!
//! This module never touches the network; handing the intent to the
//! transport is the poller's job.

use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, QueryFilter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::entity::outbox_message;
use crate::error::NotificationResult;
use crate::models::{Channel, OutboxRecord};

pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Publisher for outbox events.
#[derive(Debug, Clone)]
pub struct OutboxPublisher {
    max_attempts: i32,
}

impl Default for OutboxPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl OutboxPublisher {
    pub fn new(max_attempts: i32) -> Self {
        Self { max_attempts }
    }

    /// Insert one PENDING outbox record inside the caller's transaction.
    ///
    /// Exactly one record exists per (channel, message_id, event_type)
    /// logical intent: re-publishing the same intent returns the existing
    /// record instead of creating a duplicate.
    pub async fn publish(
        &self,
        txn: &DatabaseTransaction,
        channel: Channel,
        message_id: Uuid,
        event_type: &str,
    ) -> NotificationResult<OutboxRecord> {
        debug!(
            channel = %channel,
            message_id = %message_id,
            event_type = %event_type,
            "Publishing outbox event"
        );

        if let Some(existing) = outbox_message::Entity::find()
            .filter(outbox_message::Column::Channel.eq(channel))
            .filter(outbox_message::Column::MessageId.eq(message_id))
            .filter(outbox_message::Column::EventType.eq(event_type))
            .one(txn)
            .await?
        {
            debug!(
                outbox_id = %existing.id,
                "Outbox event already published for this intent, reusing"
            );
            return Ok(existing.into());
        }

        let record = OutboxRecord::new(channel, message_id, event_type, self.max_attempts);
        let model = outbox_message::ActiveModel::from(&record).insert(txn).await?;

        info!(
            outbox_id = %record.id,
            channel = %channel,
            event_type = %event_type,
            "Outbox event published"
        );

        Ok(model.into())
    }
}
