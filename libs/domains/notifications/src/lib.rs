//! Notifications Domain
//!
//! Reliable cross-channel notification delivery built on a transactional
//! outbox: the business write and the durable intent to notify commit in the
//! same transaction, and delivery happens asynchronously with at-least-once
//! semantics and idempotent dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ Business service │  ← creates channel payload + outbox record
//! └────────┬─────────┘     in ONE transaction (OutboxPublisher)
//!          │ commit
//! ┌────────▼─────────┐
//! │   Outbox table   │  ← durable intent, PENDING
//! └────────┬─────────┘
//!          │ SKIP LOCKED claim, every 5s
//! ┌────────▼─────────┐
//! │  OutboxPoller    │  ← claims ready records, hands to the queue
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  Message queue   │  ← at-least-once transport
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  EventConsumer   │  ← routes to the channel dispatcher
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │ ChannelDispatcher│  ← idempotent send, retry/backoff bookkeeping
//! └────────┬─────────┘
//!          │
//! ┌────────▼─────────┐
//! │  ChannelSender   │  ← pluggable provider boundary
//! └──────────────────┘
//! ```
//!
//! Dispatch is idempotent: redelivery of the same event finds the payload
//! already sent and settles the outbox record without a second provider
//! call. Retry state lives on the outbox record; the payload status only
//! reflects the outcome of the last attempt.

pub mod backoff;
pub mod consumer;
pub mod device;
pub mod dispatch;
pub mod entity;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod models;
pub mod poller;
pub mod postgres;
pub mod publisher;
pub mod repository;
pub mod senders;
pub mod service;

// Re-export commonly used types
pub use backoff::BackoffPolicy;
pub use consumer::{ConsumerConfig, EventConsumer};
pub use device::{DeviceService, RegisterDevice};
pub use dispatch::{
    ChannelDispatcher, DispatcherRegistry, EmailDispatcher, InAppDispatcher, PushDispatcher,
    SmsDispatcher,
};
pub use envelope::{event_types, OutboxEventMessage, QueueMessage};
pub use error::{NotificationError, NotificationResult};
pub use models::{
    Channel, DevicePushToken, EmailMessage, MessageStatus, Notification, NotificationRecipient,
    OutboxRecord, OutboxStatus, PushPlatform, SmsMessage,
};
pub use poller::{OutboxPoller, PollerConfig};
pub use publisher::OutboxPublisher;
pub use senders::{EmailSender, InAppSender, PushSender, SendResult, SmsSender};
pub use service::{NewEmail, NewNotification, NewSms, NotificationService};
