use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{AdminQueueEntry, QueuePositionPayload, ServerMessage};

pub type ConnectionId = Uuid;

/// What a connection is listening to: one patient's position, or a staff
/// view of a doctor's queue (`doctor_id: None` follows every doctor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionScope {
    Patient(Uuid),
    Admin { doctor_id: Option<Uuid> },
}

impl SubscriptionScope {
    fn covers_patient(&self, patient_id: Uuid) -> bool {
        matches!(self, SubscriptionScope::Patient(id) if *id == patient_id)
    }

    fn covers_doctor_queue(&self, doctor_id: Uuid) -> bool {
        match self {
            SubscriptionScope::Admin { doctor_id: None } => true,
            SubscriptionScope::Admin { doctor_id: Some(id) } => *id == doctor_id,
            SubscriptionScope::Patient(_) => false,
        }
    }
}

struct ConnectionEntry {
    scope: Option<SubscriptionScope>,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

/// Registry of open realtime connections. One entry per connection, at most
/// one scope per entry; sends are fire-and-forget and a connection whose
/// receiver has gone away is evicted on the next send touching it.
pub struct QueueBroadcastService {
    connections: Arc<RwLock<HashMap<ConnectionId, ConnectionEntry>>>,
}

impl QueueBroadcastService {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add a connection and hand back its outbound message stream.
    pub async fn register(
        &self,
        connection_id: ConnectionId,
    ) -> mpsc::UnboundedReceiver<ServerMessage> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut connections = self.connections.write().await;
        connections.insert(connection_id, ConnectionEntry { scope: None, sender });

        debug!("Registered queue connection {}", connection_id);
        receiver
    }

    pub async fn remove(&self, connection_id: ConnectionId) {
        let mut connections = self.connections.write().await;
        connections.remove(&connection_id);
        debug!("Removed queue connection {}", connection_id);
    }

    /// Replace the connection's scope. Returns false for a connection that
    /// is no longer registered.
    pub async fn set_scope(&self, connection_id: ConnectionId, scope: SubscriptionScope) -> bool {
        let mut connections = self.connections.write().await;
        match connections.get_mut(&connection_id) {
            Some(entry) => {
                entry.scope = Some(scope);
                true
            }
            None => false,
        }
    }

    pub async fn scope_of(&self, connection_id: ConnectionId) -> Option<SubscriptionScope> {
        let connections = self.connections.read().await;
        connections.get(&connection_id).and_then(|entry| entry.scope)
    }

    pub async fn connection_count(&self) -> usize {
        let connections = self.connections.read().await;
        connections.len()
    }

    /// Direct send, used for the snapshot that answers a subscribe.
    pub async fn send_to(&self, connection_id: ConnectionId, message: ServerMessage) {
        let dead = {
            let connections = self.connections.read().await;
            match connections.get(&connection_id) {
                Some(entry) => entry.sender.send(message).is_err(),
                None => false,
            }
        };

        if dead {
            warn!("Dropping queue connection {} after failed send", connection_id);
            self.remove(connection_id).await;
        }
    }

    /// Push a position payload to every connection subscribed to the patient.
    pub async fn publish_position(&self, patient_id: Uuid, payload: QueuePositionPayload) {
        let message = ServerMessage::QueuePosition { data: payload };
        self.publish(
            |scope| scope.covers_patient(patient_id),
            message,
        )
        .await;
    }

    /// Push the doctor's full queue to every admin subscriber covering it.
    pub async fn publish_admin(&self, doctor_id: Uuid, entries: Vec<AdminQueueEntry>) {
        let message = ServerMessage::AdminQueueUpdate { data: entries };
        self.publish(
            |scope| scope.covers_doctor_queue(doctor_id),
            message,
        )
        .await;
    }

    async fn publish<F>(&self, matches: F, message: ServerMessage)
    where
        F: Fn(&SubscriptionScope) -> bool,
    {
        let mut dead: Vec<ConnectionId> = Vec::new();

        {
            let connections = self.connections.read().await;
            for (connection_id, entry) in connections.iter() {
                let Some(scope) = &entry.scope else { continue };
                if !matches(scope) {
                    continue;
                }
                if entry.sender.send(message.clone()).is_err() {
                    dead.push(*connection_id);
                }
            }
        }

        if !dead.is_empty() {
            let mut connections = self.connections.write().await;
            for connection_id in dead {
                warn!("Dropping queue connection {} after failed send", connection_id);
                connections.remove(&connection_id);
            }
        }
    }
}

impl Default for QueueBroadcastService {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for QueueBroadcastService {
    fn clone(&self) -> Self {
        Self {
            connections: Arc::clone(&self.connections),
        }
    }
}
