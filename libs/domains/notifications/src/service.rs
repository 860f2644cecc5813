//! Notification write paths.
//!
//! Every path here persists the channel payload and the outbox record in
//! one transaction, which is the whole point of the outbox pattern: once
//! the business transaction commits, the intent to notify cannot be lost.
//! Past commit the model is fire-and-forget; delivery failures are never
//! surfaced to the original caller.

use sea_orm::{ActiveModelTrait, DatabaseConnection, TransactionTrait};
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use crate::entity::{email_message, notification, notification_recipient, sms_message};
use crate::envelope::event_types;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{
    Channel, EmailMessage, Notification, NotificationRecipient, OutboxRecord, SmsMessage,
};
use crate::publisher::OutboxPublisher;

/// New email request.
#[derive(Debug, Clone)]
pub struct NewEmail {
    pub to_email: String,
    pub cc_email: Option<String>,
    pub subject: String,
    pub body: String,
}

/// New SMS request.
#[derive(Debug, Clone)]
pub struct NewSms {
    pub phone_number: String,
    pub body: String,
}

/// New push / in-app notification request.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub channel: Channel,
    pub subject: String,
    pub body: String,
    pub metadata: JsonValue,
    pub recipients: Vec<Uuid>,
}

/// Service creating notification payloads together with their outbox
/// records.
pub struct NotificationService {
    db: DatabaseConnection,
    publisher: OutboxPublisher,
}

impl NotificationService {
    pub fn new(db: DatabaseConnection, publisher: OutboxPublisher) -> Self {
        Self { db, publisher }
    }

    /// Queue an email for delivery.
    pub async fn queue_email(
        &self,
        input: NewEmail,
    ) -> NotificationResult<(EmailMessage, OutboxRecord)> {
        let email = EmailMessage::new(input.to_email, input.cc_email, input.subject, input.body);

        let txn = self.db.begin().await?;
        email_message::ActiveModel::from(&email).insert(&txn).await?;
        let outbox = self
            .publisher
            .publish(&txn, Channel::Email, email.id, event_types::EMAIL_REQUESTED)
            .await?;
        txn.commit().await?;

        info!(email_id = %email.id, outbox_id = %outbox.id, "Email queued");
        Ok((email, outbox))
    }

    /// Queue an SMS for delivery.
    pub async fn queue_sms(&self, input: NewSms) -> NotificationResult<(SmsMessage, OutboxRecord)> {
        let sms = SmsMessage::new(input.phone_number, input.body);

        let txn = self.db.begin().await?;
        sms_message::ActiveModel::from(&sms).insert(&txn).await?;
        let outbox = self
            .publisher
            .publish(&txn, Channel::Sms, sms.id, event_types::SMS_REQUESTED)
            .await?;
        txn.commit().await?;

        info!(sms_id = %sms.id, outbox_id = %outbox.id, "SMS queued");
        Ok((sms, outbox))
    }

    /// Queue a push or in-app notification for a set of recipients.
    ///
    /// One content row, one recipient row per user, one outbox record per
    /// recipient, all in the same transaction.
    pub async fn queue_notification(
        &self,
        input: NewNotification,
    ) -> NotificationResult<(Notification, Vec<(NotificationRecipient, OutboxRecord)>)> {
        let event_type = match input.channel {
            Channel::Push => event_types::PUSH_REQUESTED,
            Channel::InApp => event_types::IN_APP_REQUESTED,
            other => return Err(NotificationError::UnsupportedChannel(other)),
        };

        let content = Notification::new(input.subject, input.body, input.metadata);

        let txn = self.db.begin().await?;
        notification::ActiveModel::from(&content).insert(&txn).await?;

        let mut deliveries = Vec::with_capacity(input.recipients.len());
        for user_id in input.recipients {
            let recipient = NotificationRecipient::new(content.id, user_id);
            notification_recipient::ActiveModel::from(&recipient)
                .insert(&txn)
                .await?;
            let outbox = self
                .publisher
                .publish(&txn, input.channel, recipient.id, event_type)
                .await?;
            deliveries.push((recipient, outbox));
        }
        txn.commit().await?;

        info!(
            notification_id = %content.id,
            channel = %input.channel,
            recipients = deliveries.len(),
            "Notification queued"
        );
        Ok((content, deliveries))
    }
}
