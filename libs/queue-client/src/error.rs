use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueClientError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] serde_json::Error),
}
