use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::LiveQueueError;
use crate::models::{
    AdminQueueEntry, CreateTokenRequest, QueuePositionPayload, QueueStats, QueueToken,
    ServerMessage, TokenStatus,
};
use crate::services::broadcast::{ConnectionId, QueueBroadcastService, SubscriptionScope};
use crate::services::position::{placement_for_patient, rank_waiting_tokens};
use crate::services::store::QueueStoreService;

/// The live queue engine: reacts to token mutations by recomputing the
/// affected doctor's waiting set and pushing fresh snapshots to every
/// subscriber whose scope covers the change.
///
/// One instance lives for the whole process; the connection registry it
/// owns is reached only through subscribe/publish/remove.
pub struct LiveQueueService {
    store: QueueStoreService,
    broadcast: QueueBroadcastService,
    config: Arc<AppConfig>,
    doctor_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LiveQueueService {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            store: QueueStoreService::new(&config),
            broadcast: QueueBroadcastService::new(),
            config,
            doctor_locks: RwLock::new(HashMap::new()),
        }
    }

    pub fn broadcast(&self) -> &QueueBroadcastService {
        &self.broadcast
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    // -----------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------

    /// Current position payload for one patient. A patient with no active
    /// token gets the neutral "not currently queued" payload, never an error.
    pub async fn patient_snapshot(
        &self,
        patient_id: Uuid,
        auth_token: &str,
    ) -> Result<QueuePositionPayload, LiveQueueError> {
        let token = self
            .store
            .find_active_token_for_patient(patient_id, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        let Some(token) = token else {
            return Ok(QueuePositionPayload::not_queued());
        };

        if token.status != TokenStatus::Waiting {
            return Ok(QueuePositionPayload::unranked(token.token_number, token.status));
        }

        let waiting = self
            .store
            .list_waiting_tokens(token.doctor_id, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;
        let placements = rank_waiting_tokens(waiting, self.config.avg_consultation_minutes);

        Ok(match placement_for_patient(&placements, patient_id) {
            Some(placement) => QueuePositionPayload::waiting(
                placement.token.token_number,
                placement.position,
                placement.estimated_wait_time,
            ),
            None => QueuePositionPayload::not_queued(),
        })
    }

    /// Full ordered queue for one doctor: tokens being served first, then
    /// the waiting set in rank order.
    pub async fn admin_snapshot(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<Vec<AdminQueueEntry>, LiveQueueError> {
        let active = self
            .store
            .list_active_tokens(Some(doctor_id), auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        Ok(Self::admin_entries(&active, self.config.avg_consultation_minutes))
    }

    /// One (doctor, queue) group per doctor with active tokens; this is the
    /// clinic-wide admin feed's initial snapshot.
    pub async fn admin_snapshots_all(
        &self,
        auth_token: &str,
    ) -> Result<Vec<(Uuid, Vec<AdminQueueEntry>)>, LiveQueueError> {
        let active = self
            .store
            .list_active_tokens(None, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        let mut by_doctor: HashMap<Uuid, Vec<QueueToken>> = HashMap::new();
        for token in active {
            by_doctor.entry(token.doctor_id).or_default().push(token);
        }

        Ok(by_doctor
            .into_iter()
            .map(|(doctor_id, tokens)| {
                let entries = Self::admin_entries(&tokens, self.config.avg_consultation_minutes);
                (doctor_id, entries)
            })
            .collect())
    }

    pub async fn queue_stats(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<QueueStats, LiveQueueError> {
        let active = self
            .store
            .list_active_tokens(Some(doctor_id), auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        Ok(QueueStats {
            doctor_id,
            waiting: active
                .iter()
                .filter(|t| t.status == TokenStatus::Waiting)
                .count(),
            being_served: active.iter().filter(|t| t.status.is_being_served()).count(),
            connected_subscribers: self.broadcast.connection_count().await,
        })
    }

    // -----------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------

    /// Set (or replace) the connection's scope and answer with a snapshot.
    /// Re-subscribing to the same scope just resends the current snapshot.
    pub async fn subscribe(
        &self,
        connection_id: ConnectionId,
        scope: SubscriptionScope,
        auth_token: &str,
    ) -> Result<(), LiveQueueError> {
        if !self.broadcast.set_scope(connection_id, scope).await {
            warn!("Subscribe on unknown queue connection {}", connection_id);
            return Ok(());
        }

        match scope {
            SubscriptionScope::Patient(patient_id) => {
                let payload = self.patient_snapshot(patient_id, auth_token).await?;
                self.broadcast
                    .send_to(connection_id, ServerMessage::QueuePosition { data: payload })
                    .await;
            }
            SubscriptionScope::Admin { doctor_id: Some(doctor_id) } => {
                let entries = self.admin_snapshot(doctor_id, auth_token).await?;
                self.broadcast
                    .send_to(connection_id, ServerMessage::AdminQueueUpdate { data: entries })
                    .await;
            }
            SubscriptionScope::Admin { doctor_id: None } => {
                for (_, entries) in self.admin_snapshots_all(auth_token).await? {
                    self.broadcast
                        .send_to(connection_id, ServerMessage::AdminQueueUpdate { data: entries })
                        .await;
                }
            }
        }

        debug!("Queue connection {} subscribed to {:?}", connection_id, scope);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Mutations (staff actions)
    // -----------------------------------------------------------------

    /// Intake: issue the next token number for the doctor's session. At most
    /// one active token per patient.
    pub async fn create_token(
        &self,
        request: CreateTokenRequest,
        auth_token: &str,
    ) -> Result<QueueToken, LiveQueueError> {
        let existing = self
            .store
            .find_active_token_for_patient(request.patient_id, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;
        if existing.is_some() {
            return Err(LiveQueueError::DuplicateActiveToken(
                request.patient_id.to_string(),
            ));
        }

        let lock = self.doctor_lock(request.doctor_id).await;
        let _guard = lock.lock().await;

        let token_number = self
            .store
            .next_token_number(request.doctor_id, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        let token = self
            .store
            .insert_token(&request, token_number, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        info!(
            "Issued queue token {} (#{}) for doctor {}",
            token.id, token.token_number, token.doctor_id
        );

        self.refresh_and_broadcast(token.doctor_id, None, auth_token)
            .await?;

        Ok(token)
    }

    /// Apply a staff-driven status transition, then recompute and broadcast
    /// the affected doctor's queue.
    pub async fn transition_token(
        &self,
        token_id: Uuid,
        target: TokenStatus,
        auth_token: &str,
    ) -> Result<QueueToken, LiveQueueError> {
        let current = self
            .store
            .get_token(token_id, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?
            .ok_or_else(|| LiveQueueError::TokenNotFound(token_id.to_string()))?;

        if !current.status.can_transition_to(&target) {
            return Err(LiveQueueError::InvalidStatusTransition {
                from: format!("{:?}", current.status),
                to: format!("{:?}", target),
            });
        }

        let lock = self.doctor_lock(current.doctor_id).await;
        let _guard = lock.lock().await;

        let updated = self
            .store
            .update_token_status(token_id, target, auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        info!(
            "Queue token {} (#{}) moved to {:?}",
            updated.id, updated.token_number, updated.status
        );

        self.refresh_and_broadcast(updated.doctor_id, Some(&updated), auth_token)
            .await?;

        Ok(updated)
    }

    /// Recompute and broadcast after a mutation applied outside this
    /// service (e.g. an appointment cancellation cascading into the store).
    pub async fn publish_queue_changed(
        &self,
        doctor_id: Uuid,
        auth_token: &str,
    ) -> Result<(), LiveQueueError> {
        let lock = self.doctor_lock(doctor_id).await;
        let _guard = lock.lock().await;
        self.refresh_and_broadcast(doctor_id, None, auth_token).await
    }

    // -----------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------

    /// Recompute the doctor's queue from a fresh store snapshot, persist
    /// changed wait estimates, and push updates to every covered scope.
    /// Caller holds the doctor's lock, so snapshots go out in mutation
    /// order for any one doctor.
    async fn refresh_and_broadcast(
        &self,
        doctor_id: Uuid,
        moved: Option<&QueueToken>,
        auth_token: &str,
    ) -> Result<(), LiveQueueError> {
        let active = self
            .store
            .list_active_tokens(Some(doctor_id), auth_token)
            .await
            .map_err(|e| LiveQueueError::Store(e.to_string()))?;

        let placements =
            rank_waiting_tokens(active.clone(), self.config.avg_consultation_minutes);

        // Keep the persisted estimates fresh for polling clients. A store
        // hiccup here must not stop the broadcast.
        let stale: Vec<(Uuid, i32)> = placements
            .iter()
            .filter(|p| p.token.estimated_wait_time != p.estimated_wait_time)
            .map(|p| (p.token.id, p.estimated_wait_time))
            .collect();
        if !stale.is_empty() {
            if let Err(e) = self.store.update_wait_estimates(&stale, auth_token).await {
                warn!("Failed to persist wait estimates for doctor {}: {}", doctor_id, e);
            }
        }

        let entries = Self::admin_entries(&active, self.config.avg_consultation_minutes);
        self.broadcast.publish_admin(doctor_id, entries).await;

        for placement in &placements {
            let payload = QueuePositionPayload::waiting(
                placement.token.token_number,
                placement.position,
                placement.estimated_wait_time,
            );
            self.broadcast
                .publish_position(placement.token.patient_id, payload)
                .await;
        }

        for token in active.iter().filter(|t| t.status.is_being_served()) {
            let payload = QueuePositionPayload::unranked(token.token_number, token.status);
            self.broadcast
                .publish_position(token.patient_id, payload)
                .await;
        }

        // A token that just left the queue is not in the active set any
        // more; its patient still gets told where it ended up.
        if let Some(token) = moved {
            if token.status.is_terminal() {
                let payload = QueuePositionPayload::unranked(token.token_number, token.status);
                self.broadcast
                    .publish_position(token.patient_id, payload)
                    .await;
            }
        }

        debug!(
            "Recomputed queue for doctor {}: {} waiting, {} active",
            doctor_id,
            placements.len(),
            active.len()
        );
        Ok(())
    }

    fn admin_entries(active: &[QueueToken], avg_consultation_minutes: u32) -> Vec<AdminQueueEntry> {
        let placements = rank_waiting_tokens(active.to_vec(), avg_consultation_minutes);

        let mut entries: Vec<AdminQueueEntry> = Vec::with_capacity(active.len());

        let mut serving: Vec<&QueueToken> = active
            .iter()
            .filter(|t| t.status.is_being_served())
            .collect();
        serving.sort_by_key(|t| t.called_at);
        for token in serving {
            entries.push(AdminQueueEntry::from_token(token, 0));
        }

        for placement in &placements {
            entries.push(AdminQueueEntry::from_token(
                &placement.token,
                placement.estimated_wait_time,
            ));
        }

        entries
    }

    async fn doctor_lock(&self, doctor_id: Uuid) -> Arc<Mutex<()>> {
        {
            let locks = self.doctor_locks.read().await;
            if let Some(lock) = locks.get(&doctor_id) {
                return Arc::clone(lock);
            }
        }

        let mut locks = self.doctor_locks.write().await;
        Arc::clone(locks.entry(doctor_id).or_default())
    }
}
