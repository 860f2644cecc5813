//! Channel dispatch.
//!
//! The registry maps each channel to the dispatcher implementing its
//! send/retry logic. Dispatchers follow a common algorithm:
//!
//! 1. Load the outbox record; absent means a duplicate/late delivery, so no-op.
//! 2. Load the channel payload; absent is unrecoverable, mark INVALID.
//! 3. Idempotency guard: payload already sent, so settle the outbox record
//!    and return without calling the provider.
//! 4. Mark the payload `sending`, invoke the provider with a bounded
//!    timeout, and record the outcome on both the payload and the outbox
//!    record (channel-specific backoff on failure).
//!
//! A dispatcher returns `Err` only on storage failures; provider failures
//! are recorded state, not errors, so the consumer can acknowledge the
//! message and redelivery stays transport-driven.

pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;

pub use email::EmailDispatcher;
pub use in_app::InAppDispatcher;
pub use push::PushDispatcher;
pub use sms::SmsDispatcher;

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::envelope::OutboxEventMessage;
use crate::error::{NotificationError, NotificationResult};
use crate::models::Channel;
use crate::senders::SendResult;

/// Default bound on a single provider call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// A channel's delivery logic.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    /// The channel this dispatcher serves.
    fn channel(&self) -> Channel;

    /// Perform one idempotent delivery attempt for the event.
    async fn dispatch(&self, event: &OutboxEventMessage) -> NotificationResult<()>;
}

/// Registry mapping channels to dispatchers, resolved once at startup.
///
/// Adding a channel means adding an enum variant and registering an
/// implementation here; call sites never branch on channel types.
#[derive(Default)]
pub struct DispatcherRegistry {
    dispatchers: HashMap<Channel, Arc<dyn ChannelDispatcher>>,
}

impl DispatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, dispatcher: Arc<dyn ChannelDispatcher>) -> Self {
        self.dispatchers.insert(dispatcher.channel(), dispatcher);
        self
    }

    /// Look up the dispatcher for a channel.
    ///
    /// A missing dispatcher is a wiring defect and fails loudly rather
    /// than silently dropping the event.
    pub fn get(&self, channel: Channel) -> NotificationResult<Arc<dyn ChannelDispatcher>> {
        self.dispatchers
            .get(&channel)
            .cloned()
            .ok_or(NotificationError::DispatcherNotRegistered(channel))
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.dispatchers.keys().copied().collect()
    }
}

/// Run a provider call under a timeout, folding timeouts and errors into a
/// failed [`SendResult`].
///
/// A timed-out call is a retryable failure, never success: the send may or
/// may not have happened, and the idempotency guard absorbs the resulting
/// redelivery risk.
pub(crate) async fn bounded_send<F>(timeout: Duration, call: F) -> SendResult
where
    F: Future<Output = NotificationResult<SendResult>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => SendResult::failure(e.to_string(), "EXCEPTION"),
        Err(_) => SendResult::failure("provider call timed out", "TIMEOUT"),
    }
}
