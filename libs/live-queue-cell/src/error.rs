use thiserror::Error;

#[derive(Error, Debug)]
pub enum LiveQueueError {
    #[error("Queue store operation failed: {0}")]
    Store(String),

    #[error("Token not found: {0}")]
    TokenNotFound(String),

    #[error("Invalid token status transition from {from} to {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Patient {0} already holds an active queue token")]
    DuplicateActiveToken(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
