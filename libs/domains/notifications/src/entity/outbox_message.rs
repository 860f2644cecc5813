use crate::models::{Channel, OutboxRecord, OutboxStatus};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

/// Transactional outbox table: durable intents to deliver, persisted
/// atomically with the business data that caused them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "outbox_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub channel: Channel,
    pub message_id: Uuid,
    pub event_type: String,
    pub status: OutboxStatus,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<DateTimeUtc>,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub processing_started_at: Option<DateTimeUtc>,
    pub processed_at: Option<DateTimeUtc>,
    pub partition_key: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for OutboxRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            channel: model.channel,
            message_id: model.message_id,
            event_type: model.event_type,
            status: model.status,
            attempt_count: model.attempt_count,
            max_attempts: model.max_attempts,
            next_attempt_at: model.next_attempt_at,
            last_error: model.last_error,
            processing_started_at: model.processing_started_at,
            processed_at: model.processed_at,
            partition_key: model.partition_key,
            created_at: model.created_at,
        }
    }
}

impl From<&OutboxRecord> for ActiveModel {
    fn from(record: &OutboxRecord) -> Self {
        ActiveModel {
            id: Set(record.id),
            channel: Set(record.channel),
            message_id: Set(record.message_id),
            event_type: Set(record.event_type.clone()),
            status: Set(record.status),
            attempt_count: Set(record.attempt_count),
            max_attempts: Set(record.max_attempts),
            next_attempt_at: Set(record.next_attempt_at),
            last_error: Set(record.last_error.clone()),
            processing_started_at: Set(record.processing_started_at),
            processed_at: Set(record.processed_at),
            partition_key: Set(record.partition_key.clone()),
            created_at: Set(record.created_at),
        }
    }
}
