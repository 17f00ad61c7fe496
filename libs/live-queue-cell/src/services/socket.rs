use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::ClientMessage;
use crate::services::broadcast::{ConnectionId, SubscriptionScope};
use crate::services::tracker::LiveQueueService;

/// Drive one realtime connection until the peer goes away. The outbound
/// half forwards the registry's per-connection stream; the inbound half
/// handles subscribe messages. A frame that does not parse is logged and
/// discarded, the connection stays open.
pub async fn handle_queue_socket(
    socket: WebSocket,
    service: Arc<LiveQueueService>,
    user: User,
    auth_token: String,
) {
    let connection_id = Uuid::new_v4();
    let mut updates = service.broadcast().register(connection_id).await;

    let (mut sink, mut stream) = socket.split();

    let forward = tokio::spawn(async move {
        while let Some(message) = updates.recv().await {
            let payload = match serde_json::to_string(&message) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("Failed to serialize queue update: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                handle_client_message(&service, connection_id, &user, &auth_token, text.as_str())
                    .await;
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    forward.abort();
    service.broadcast().remove(connection_id).await;
    debug!("Queue connection {} closed", connection_id);
}

async fn handle_client_message(
    service: &LiveQueueService,
    connection_id: ConnectionId,
    user: &User,
    auth_token: &str,
    text: &str,
) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(
                "Discarding malformed message on queue connection {}: {}",
                connection_id, e
            );
            return;
        }
    };

    let scope = match message {
        ClientMessage::SubscribePatientQueue { patient_id } => {
            if !user.is_staff() && user.id != patient_id.to_string() {
                warn!(
                    "Connection {} denied patient scope for {}",
                    connection_id, patient_id
                );
                return;
            }
            SubscriptionScope::Patient(patient_id)
        }
        ClientMessage::SubscribeAdminQueue { doctor_id } => {
            if !user.is_staff() {
                warn!("Connection {} denied admin scope", connection_id);
                return;
            }
            SubscriptionScope::Admin { doctor_id }
        }
    };

    if let Err(e) = service.subscribe(connection_id, scope, auth_token).await {
        warn!(
            "Subscribe failed on queue connection {}: {}",
            connection_id, e
        );
    }
}
