use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers::{
    call_token, complete_token, create_token, get_admin_queue, get_my_position, get_queue_stats,
    miss_token, queue_socket, start_token,
};
use crate::services::tracker::LiveQueueService;

pub fn create_live_queue_router(
    config: Arc<AppConfig>,
    service: Arc<LiveQueueService>,
) -> Router {
    let protected_routes = Router::new()
        .route("/ws", get(queue_socket))
        .route("/position", get(get_my_position))
        .route("/admin", get(get_admin_queue))
        .route("/stats", get(get_queue_stats))
        .route("/tokens", post(create_token))
        .route("/tokens/{token_id}/call", post(call_token))
        .route("/tokens/{token_id}/start", post(start_token))
        .route("/tokens/{token_id}/complete", post(complete_token))
        .route("/tokens/{token_id}/miss", post(miss_token))
        .layer(middleware::from_fn_with_state(config, auth_middleware));

    Router::new().merge(protected_routes).with_state(service)
}
