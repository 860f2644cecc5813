//! Email channel dispatcher.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{bounded_send, ChannelDispatcher, DEFAULT_SEND_TIMEOUT};
use crate::backoff::BackoffPolicy;
use crate::envelope::OutboxEventMessage;
use crate::error::NotificationResult;
use crate::models::{Channel, EmailMessage, MessageStatus, OutboxRecord};
use crate::repository::{EmailMessageRepository, OutboxRepository};
use crate::senders::{EmailSender, SendResult};

pub struct EmailDispatcher<O, E, S> {
    outbox: Arc<O>,
    emails: Arc<E>,
    sender: Arc<S>,
    backoff: BackoffPolicy,
    send_timeout: Duration,
}

impl<O, E, S> EmailDispatcher<O, E, S>
where
    O: OutboxRepository,
    E: EmailMessageRepository,
    S: EmailSender,
{
    pub fn new(outbox: Arc<O>, emails: Arc<E>, sender: Arc<S>) -> Self {
        Self {
            outbox,
            emails,
            sender,
            backoff: BackoffPolicy::email(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    async fn send(&self, outbox: &mut OutboxRecord, email: &mut EmailMessage) -> NotificationResult<()> {
        let now = Utc::now();
        email.mark_sending(now);
        self.emails.update(email).await?;

        info!(
            email_id = %email.id,
            to = %email.to_email,
            cc = ?email.cc_email,
            "Sending email"
        );
        let result = bounded_send(self.send_timeout, self.sender.send_email(email)).await;

        if result.success {
            email.mark_sent(now);
            self.emails.update(email).await?;

            outbox.mark_processed(now);
            self.outbox.update(outbox).await?;

            info!(
                email_id = %email.id,
                provider_id = ?result.provider_id,
                "Email sent successfully"
            );
            Ok(())
        } else {
            self.handle_failure(outbox, email, &result).await
        }
    }

    async fn handle_failure(
        &self,
        outbox: &mut OutboxRecord,
        email: &mut EmailMessage,
        result: &SendResult,
    ) -> NotificationResult<()> {
        let label = result.error_label();
        let now = Utc::now();

        if result.permanent {
            outbox.record_permanent_failure(&label, now);
        } else {
            outbox.record_failure(&label, &self.backoff, now);
        }
        self.outbox.update(outbox).await?;

        email.record_failure(&label);
        self.emails.update(email).await?;

        if outbox.next_attempt_at.is_none() {
            error!(
                email_id = %email.id,
                attempts = %outbox.attempt_count,
                error = %label,
                "Email delivery permanently failed"
            );
        } else {
            warn!(
                email_id = %email.id,
                attempt = %outbox.attempt_count,
                max_attempts = %outbox.max_attempts,
                next_attempt_at = ?outbox.next_attempt_at,
                error = %label,
                "Email delivery failed, will retry"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl<O, E, S> ChannelDispatcher for EmailDispatcher<O, E, S>
where
    O: OutboxRepository,
    E: EmailMessageRepository,
    S: EmailSender,
{
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn dispatch(&self, event: &OutboxEventMessage) -> NotificationResult<()> {
        let Some(mut outbox) = self.outbox.find_by_id(event.event_id).await? else {
            debug!(event_id = %event.event_id, "Outbox record not found, ignoring late delivery");
            return Ok(());
        };

        let Some(mut email) = self.emails.find_by_id(event.message_id).await? else {
            warn!(
                event_id = %event.event_id,
                message_id = %event.message_id,
                "Email message not found, marking outbox record invalid"
            );
            outbox.mark_invalid("email message not found");
            self.outbox.update(&outbox).await?;
            return Ok(());
        };

        if email.status == MessageStatus::Sent {
            info!(email_id = %email.id, "Email already sent, skipping");
            outbox.mark_processed(Utc::now());
            self.outbox.update(&outbox).await?;
            return Ok(());
        }

        self.send(&mut outbox, &mut email).await
    }
}
