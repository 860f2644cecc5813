use crate::models::Notification;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

/// Notification content shared by push and in-app deliveries; per-recipient
/// delivery state lives in `notification_recipient`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "notification")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub body: String,
    pub metadata: Json,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Notification {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            subject: model.subject,
            body: model.body,
            metadata: model.metadata,
            created_at: model.created_at,
        }
    }
}

impl From<&Notification> for ActiveModel {
    fn from(notification: &Notification) -> Self {
        ActiveModel {
            id: Set(notification.id),
            subject: Set(notification.subject.clone()),
            body: Set(notification.body.clone()),
            metadata: Set(notification.metadata.clone()),
            created_at: Set(notification.created_at),
        }
    }
}
