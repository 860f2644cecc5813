//! Mock provider implementations for development and testing.
//!
//! Every send succeeds and is logged; the returned provider ids are unique
//! so idempotency and bookkeeping paths behave like production.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use super::{EmailSender, InAppSender, PushSender, SendResult, SmsSender};
use crate::error::NotificationResult;
use crate::models::{DevicePushToken, EmailMessage, Notification, SmsMessage};

/// Mock email provider.
#[derive(Debug, Default, Clone)]
pub struct MockEmailProvider;

#[async_trait]
impl EmailSender for MockEmailProvider {
    async fn send_email(&self, email: &EmailMessage) -> NotificationResult<SendResult> {
        info!(
            to = %email.to_email,
            subject = %email.subject,
            "MOCK: sending email"
        );
        Ok(SendResult::success(
            format!("mock-email-{}", Uuid::new_v4()),
            "MOCK_EMAIL_PROVIDER",
        ))
    }

    fn name(&self) -> &'static str {
        "MOCK_EMAIL_PROVIDER"
    }
}

/// Mock SMS provider.
#[derive(Debug, Default, Clone)]
pub struct MockSmsProvider;

#[async_trait]
impl SmsSender for MockSmsProvider {
    async fn send_sms(&self, sms: &SmsMessage) -> NotificationResult<SendResult> {
        info!(phone_number = %sms.phone_number, "MOCK: sending SMS");
        Ok(SendResult::success(
            format!("mock-sms-{}", Uuid::new_v4()),
            "MOCK_SMS_PROVIDER",
        ))
    }

    fn name(&self) -> &'static str {
        "MOCK_SMS_PROVIDER"
    }
}

/// Mock push provider.
#[derive(Debug, Default, Clone)]
pub struct MockPushProvider;

#[async_trait]
impl PushSender for MockPushProvider {
    async fn send_push(
        &self,
        token: &DevicePushToken,
        notification: &Notification,
    ) -> NotificationResult<SendResult> {
        info!(
            token_id = %token.id,
            platform = %token.platform,
            subject = %notification.subject,
            "MOCK: sending push"
        );
        Ok(SendResult::success(
            format!("mock-push-{}", Uuid::new_v4()),
            "MOCK_PUSH_PROVIDER",
        ))
    }

    fn name(&self) -> &'static str {
        "MOCK_PUSH_PROVIDER"
    }
}

/// Mock in-app provider.
#[derive(Debug, Default, Clone)]
pub struct MockInAppProvider;

#[async_trait]
impl InAppSender for MockInAppProvider {
    async fn send_in_app(
        &self,
        user_id: Uuid,
        notification: &Notification,
    ) -> NotificationResult<SendResult> {
        info!(
            user_id = %user_id,
            subject = %notification.subject,
            "MOCK: sending in-app notification"
        );
        Ok(SendResult::success(
            format!("mock-in-app-{}", Uuid::new_v4()),
            "MOCK_IN_APP_PROVIDER",
        ))
    }

    fn name(&self) -> &'static str {
        "MOCK_IN_APP_PROVIDER"
    }
}
