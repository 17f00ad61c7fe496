use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    response::{Json, Response},
    Extension,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use shared_models::{auth::User, error::AppError};

use crate::error::LiveQueueError;
use crate::models::{
    AdminQueueEntry, CreateTokenRequest, QueuePositionPayload, QueueStats, QueueToken, TokenStatus,
};
use crate::services::{socket::handle_queue_socket, tracker::LiveQueueService};

#[derive(Debug, Deserialize)]
pub struct DoctorQueueQuery {
    pub doctor_id: Uuid,
}

/// Realtime feed. The connection authenticates like any other route; scope
/// selection happens via subscribe messages once the socket is up.
pub async fn queue_socket(
    ws: WebSocketUpgrade,
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Response {
    info!("Queue socket upgrade for user: {}", user.id);
    let auth_token = auth.token().to_string();
    ws.on_upgrade(move |socket| handle_queue_socket(socket, service, user, auth_token))
}

/// Fallback polling endpoint: same payload the realtime feed pushes.
pub async fn get_my_position(
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<QueuePositionPayload>, AppError> {
    let patient_id = Uuid::parse_str(&user.id)
        .map_err(|_| AppError::BadRequest("Invalid user ID format".to_string()))?;

    let payload = service
        .patient_snapshot(patient_id, auth.token())
        .await
        .map_err(|e| {
            error!("Failed to build position snapshot: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(payload))
}

/// Fallback polling endpoint for the staff dashboard.
pub async fn get_admin_queue(
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<DoctorQueueQuery>,
) -> Result<Json<Vec<AdminQueueEntry>>, AppError> {
    require_staff(&user)?;

    let entries = service
        .admin_snapshot(query.doctor_id, auth.token())
        .await
        .map_err(|e| {
            error!("Failed to build admin snapshot: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(entries))
}

pub async fn get_queue_stats(
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Query(query): Query<DoctorQueueQuery>,
) -> Result<Json<QueueStats>, AppError> {
    require_staff(&user)?;

    let stats = service
        .queue_stats(query.doctor_id, auth.token())
        .await
        .map_err(|e| {
            error!("Failed to read queue stats: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(stats))
}

/// Intake: put a patient into a doctor's queue.
pub async fn create_token(
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<CreateTokenRequest>,
) -> Result<Json<QueueToken>, AppError> {
    require_staff(&user)?;
    info!(
        "Token intake for patient {} with doctor {} by {}",
        request.patient_id, request.doctor_id, user.id
    );

    let token = service
        .create_token(request, auth.token())
        .await
        .map_err(|e| {
            error!("Failed to create queue token: {}", e);
            map_queue_error(e)
        })?;

    Ok(Json(token))
}

pub async fn call_token(
    state: State<Arc<LiveQueueService>>,
    user: Extension<User>,
    auth: TypedHeader<Authorization<Bearer>>,
    token_id: Path<Uuid>,
) -> Result<Json<QueueToken>, AppError> {
    transition(state, user, auth, token_id, TokenStatus::Called).await
}

pub async fn start_token(
    state: State<Arc<LiveQueueService>>,
    user: Extension<User>,
    auth: TypedHeader<Authorization<Bearer>>,
    token_id: Path<Uuid>,
) -> Result<Json<QueueToken>, AppError> {
    transition(state, user, auth, token_id, TokenStatus::InProgress).await
}

pub async fn complete_token(
    state: State<Arc<LiveQueueService>>,
    user: Extension<User>,
    auth: TypedHeader<Authorization<Bearer>>,
    token_id: Path<Uuid>,
) -> Result<Json<QueueToken>, AppError> {
    transition(state, user, auth, token_id, TokenStatus::Completed).await
}

pub async fn miss_token(
    state: State<Arc<LiveQueueService>>,
    user: Extension<User>,
    auth: TypedHeader<Authorization<Bearer>>,
    token_id: Path<Uuid>,
) -> Result<Json<QueueToken>, AppError> {
    transition(state, user, auth, token_id, TokenStatus::Missed).await
}

async fn transition(
    State(service): State<Arc<LiveQueueService>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Path(token_id): Path<Uuid>,
    target: TokenStatus,
) -> Result<Json<QueueToken>, AppError> {
    require_staff(&user)?;
    info!(
        "Queue token {} transition to {:?} by {}",
        token_id, target, user.id
    );

    let token = service
        .transition_token(token_id, target, auth.token())
        .await
        .map_err(|e| {
            error!("Failed to transition queue token {}: {}", token_id, e);
            map_queue_error(e)
        })?;

    Ok(Json(token))
}

fn require_staff(user: &User) -> Result<(), AppError> {
    if user.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Staff role required for queue management".to_string(),
        ))
    }
}

fn map_queue_error(e: LiveQueueError) -> AppError {
    match e {
        LiveQueueError::TokenNotFound(_) => AppError::NotFound(e.to_string()),
        LiveQueueError::InvalidStatusTransition { .. } => AppError::BadRequest(e.to_string()),
        LiveQueueError::DuplicateActiveToken(_) => AppError::Conflict(e.to_string()),
        LiveQueueError::ValidationError(_) => AppError::BadRequest(e.to_string()),
        _ => AppError::Internal("Operation failed".to_string()),
    }
}
