use crate::models::{MessageStatus, NotificationRecipient};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notification_recipient")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub notification_id: Uuid,
    pub user_id: Uuid,
    pub status: MessageStatus,
    #[sea_orm(column_type = "Text", nullable)]
    pub last_error: Option<String>,
    pub attempts: i32,
    pub sent_at: Option<DateTimeUtc>,
    pub last_attempt_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for NotificationRecipient {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            notification_id: model.notification_id,
            user_id: model.user_id,
            status: model.status,
            last_error: model.last_error,
            attempts: model.attempts,
            sent_at: model.sent_at,
            last_attempt_at: model.last_attempt_at,
            created_at: model.created_at,
        }
    }
}

impl From<&NotificationRecipient> for ActiveModel {
    fn from(recipient: &NotificationRecipient) -> Self {
        ActiveModel {
            id: Set(recipient.id),
            notification_id: Set(recipient.notification_id),
            user_id: Set(recipient.user_id),
            status: Set(recipient.status),
            last_error: Set(recipient.last_error.clone()),
            attempts: Set(recipient.attempts),
            sent_at: Set(recipient.sent_at),
            last_attempt_at: Set(recipient.last_attempt_at),
            created_at: Set(recipient.created_at),
        }
    }
}
