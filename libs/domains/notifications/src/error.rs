//! Error types for the notifications domain.

use crate::models::Channel;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Queue transport error.
    #[error("Queue error: {0}")]
    Queue(#[from] message_queue::QueueError),

    /// Provider/sender error.
    #[error("Provider error: {0}")]
    Provider(String),

    /// No dispatcher registered for a channel. This is a wiring defect,
    /// not a retryable business failure.
    #[error("No dispatcher registered for channel: {0}")]
    DispatcherNotRegistered(Channel),

    /// The channel is not valid for the requested operation.
    #[error("Unsupported channel for this operation: {0}")]
    UnsupportedChannel(Channel),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        NotificationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Internal(format!("JSON serialization error: {}", err))
    }
}
