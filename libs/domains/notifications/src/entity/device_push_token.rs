use crate::models::{DevicePushToken, PushPlatform};
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;

/// Device registrations for push notifications. At most one active token
/// exists per (device_id, platform).
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "device_push_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub device_id: String,
    pub platform: PushPlatform,
    #[sea_orm(column_type = "Text")]
    pub token: String,
    pub active: bool,
    pub last_used_at: DateTimeUtc,
    pub revoked_at: Option<DateTimeUtc>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for DevicePushToken {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            device_id: model.device_id,
            platform: model.platform,
            token: model.token,
            active: model.active,
            last_used_at: model.last_used_at,
            revoked_at: model.revoked_at,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

impl From<&DevicePushToken> for ActiveModel {
    fn from(token: &DevicePushToken) -> Self {
        ActiveModel {
            id: Set(token.id),
            user_id: Set(token.user_id),
            device_id: Set(token.device_id.clone()),
            platform: Set(token.platform),
            token: Set(token.token.clone()),
            active: Set(token.active),
            last_used_at: Set(token.last_used_at),
            revoked_at: Set(token.revoked_at),
            created_at: Set(token.created_at),
            updated_at: Set(token.updated_at),
        }
    }
}
