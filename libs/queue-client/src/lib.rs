pub mod countdown;
pub mod error;
pub mod subscriber;

pub use countdown::WaitCountdown;
pub use error::QueueClientError;
pub use subscriber::{FeedConfig, PatientQueueView, PositionFeed, QueueStream, QueueTransport};
