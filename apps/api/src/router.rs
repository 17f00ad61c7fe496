use std::sync::Arc;

use axum::{routing::get, Router};

use live_queue_cell::{create_live_queue_router, services::tracker::LiveQueueService};
use shared_config::AppConfig;

pub fn create_router(config: Arc<AppConfig>, queue_service: Arc<LiveQueueService>) -> Router {
    Router::new()
        .route("/", get(|| async { "Novara Clinic API is running!" }))
        .nest("/queue", create_live_queue_router(config, queue_service))
}
