use crate::models::{EmailMessage, MessageStatus};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "email_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub to_email: String,
    pub cc_email: Option<String>,
    pub subject: String,
    #[sea_orm(column_type = "Text")]
    pub body: String,
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

impl From<Model> for EmailMessage {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            to_email: model.to_email,
            cc_email: model.cc_email,
            subject: model.subject,
            body: model.body,
            status: model.status,
            last_error: model.last_error,
            attempts: model.attempts,
            sent_at: model.sent_at,
            last_attempt_at: model.last_attempt_at,
            created_at: model.created_at,
        }
    }
}

impl From<&EmailMessage> for ActiveModel {
    fn from(email: &EmailMessage) -> Self {
        ActiveModel {
            id: Set(email.id),
            to_email: Set(email.to_email.clone()),
            cc_email: Set(email.cc_email.clone()),
            subject: Set(email.subject.clone()),
            body: Set(email.body.clone()),
            status: Set(email.status),
            last_error: Set(email.last_error.clone()),
            attempts: Set(email.attempts),
            sent_at: Set(email.sent_at),
            last_attempt_at: Set(email.last_attempt_at),
            created_at: Set(email.created_at),
        }
    }
}
