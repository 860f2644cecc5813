//! Provider sender boundary.
//!
//! The core never assumes a specific provider: each channel is exposed as a
//! sender capability trait, and any conforming implementation is pluggable
//! at wiring time. `mock` provides the development/test implementations.

mod mock;

pub use mock::{MockEmailProvider, MockInAppProvider, MockPushProvider, MockSmsProvider};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::NotificationResult;
use crate::models::{DevicePushToken, EmailMessage, Notification, SmsMessage};

/// Result of one provider send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResult {
    pub success: bool,
    /// Provider-assigned message id, on success.
    pub provider_id: Option<String>,
    pub provider_name: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<String>,
    /// Whether the error is permanent: retrying this recipient path is
    /// futile (invalid recipient, unregistered token, ...).
    pub permanent: bool,
}

impl SendResult {
    pub fn success(provider_id: impl Into<String>, provider_name: impl Into<String>) -> Self {
        Self {
            success: true,
            provider_id: Some(provider_id.into()),
            provider_name: Some(provider_name.into()),
            error_message: None,
            error_code: None,
            permanent: false,
        }
    }

    /// A transient failure, retried on the channel's backoff schedule.
    pub fn failure(error_message: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_id: None,
            provider_name: None,
            error_message: Some(error_message.into()),
            error_code: Some(error_code.into()),
            permanent: false,
        }
    }

    /// A permanent failure: no further retries for this recipient path.
    pub fn permanent_failure(
        error_message: impl Into<String>,
        error_code: impl Into<String>,
    ) -> Self {
        Self {
            permanent: true,
            ..Self::failure(error_message, error_code)
        }
    }

    /// `"CODE: message"` label recorded on the payload and outbox record.
    pub fn error_label(&self) -> String {
        format!(
            "{}: {}",
            self.error_code.as_deref().unwrap_or("UNKNOWN"),
            self.error_message.as_deref().unwrap_or("unspecified error")
        )
    }
}

/// Email provider capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_email(&self, email: &EmailMessage) -> NotificationResult<SendResult>;

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

/// SMS provider capability.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send_sms(&self, sms: &SmsMessage) -> NotificationResult<SendResult>;

    fn name(&self) -> &'static str;
}

/// Push provider capability. Called once per device token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send_push(
        &self,
        token: &DevicePushToken,
        notification: &Notification,
    ) -> NotificationResult<SendResult>;

    fn name(&self) -> &'static str;
}

/// In-app provider capability (WebSocket/SSE fan-in).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InAppSender: Send + Sync {
    async fn send_in_app(
        &self,
        user_id: Uuid,
        notification: &Notification,
    ) -> NotificationResult<SendResult>;

    fn name(&self) -> &'static str;
}
