use crate::models::{MessageStatus, SmsMessage};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sms_message")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub phone_number: String,
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

impl From<Model> for SmsMessage {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            phone_number: model.phone_number,
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

impl From<&SmsMessage> for ActiveModel {
    fn from(sms: &SmsMessage) -> Self {
        ActiveModel {
            id: Set(sms.id),
            phone_number: Set(sms.phone_number.clone()),
            body: Set(sms.body.clone()),
            status: Set(sms.status),
            last_error: Set(sms.last_error.clone()),
            attempts: Set(sms.attempts),
            sent_at: Set(sms.sent_at),
            last_attempt_at: Set(sms.last_attempt_at),
            created_at: Set(sms.created_at),
        }
    }
}
