//! SeaORM entities for the notifications domain.
//!
//! Each entity converts to and from its domain model in `models`; business
//! logic lives on the domain side only.

pub mod device_push_token;
pub mod email_message;
pub mod notification;
pub mod notification_recipient;
pub mod outbox_message;
pub mod sms_message;
