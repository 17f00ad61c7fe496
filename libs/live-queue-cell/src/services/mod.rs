pub mod broadcast;
pub mod position;
pub mod socket;
pub mod store;
pub mod tracker;

pub use broadcast::{ConnectionId, QueueBroadcastService, SubscriptionScope};
pub use position::{placement_for_patient, rank_waiting_tokens, QueuePlacement};
pub use store::QueueStoreService;
pub use tracker::LiveQueueService;
