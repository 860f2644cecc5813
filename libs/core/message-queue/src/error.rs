use thiserror::Error;

/// Queue transport errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Failed to hand a message to the transport
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl QueueError {
    /// Whether the underlying error is a lost/broken connection.
    pub fn is_connection_error(&self) -> bool {
        match self {
            QueueError::Redis(e) => {
                e.is_connection_dropped() || e.is_connection_refusal() || e.is_io_error()
            }
            _ => false,
        }
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}
