use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const PRIORITY_NORMAL: i32 = 1;
pub const PRIORITY_URGENT: i32 = 2;
pub const PRIORITY_EMERGENCY: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Waiting,
    Called,
    InProgress,
    Completed,
    Missed,
}

impl TokenStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::Missed)
    }

    pub fn is_being_served(&self) -> bool {
        matches!(self, TokenStatus::Called | TokenStatus::InProgress)
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Forward-only lifecycle: waiting -> called -> in_progress -> completed,
    /// with waiting/called -> missed as the alternate exit.
    pub fn can_transition_to(&self, target: &TokenStatus) -> bool {
        use TokenStatus::*;
        matches!(
            (self, target),
            (Waiting, Called)
                | (Called, InProgress)
                | (InProgress, Completed)
                | (Waiting, Missed)
                | (Called, Missed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientName {
    pub first_name: String,
    pub last_name: String,
}

/// One patient's numbered place in a doctor's queue for the current session.
/// `token_number` is assigned monotonically per doctor-session and never
/// reused; `created_at` is the tie-break within a priority band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueToken {
    pub id: Uuid,
    pub token_number: i32,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub status: TokenStatus,
    pub priority: i32,
    pub estimated_wait_time: i32,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub patient: Option<PatientName>,
}

// ---------------------------------------------------------------------------
// Realtime wire contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SubscribePatientQueue {
        #[serde(rename = "patientId")]
        patient_id: Uuid,
    },
    SubscribeAdminQueue {
        #[serde(rename = "doctorId", default, skip_serializing_if = "Option::is_none")]
        doctor_id: Option<Uuid>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    QueuePosition { data: QueuePositionPayload },
    AdminQueueUpdate { data: Vec<AdminQueueEntry> },
}

/// Per-patient snapshot. `token_number: None` renders the neutral
/// "not currently queued" state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuePositionPayload {
    pub token_number: Option<i32>,
    pub position: Option<u32>,
    pub estimated_wait_time: i32,
    pub status: Option<TokenStatus>,
}

impl QueuePositionPayload {
    pub fn not_queued() -> Self {
        Self {
            token_number: None,
            position: None,
            estimated_wait_time: 0,
            status: None,
        }
    }

    pub fn waiting(token_number: i32, position: u32, estimated_wait_time: i32) -> Self {
        Self {
            token_number: Some(token_number),
            position: Some(position),
            estimated_wait_time,
            status: Some(TokenStatus::Waiting),
        }
    }

    /// A token that is being served or has left the queue has no rank.
    pub fn unranked(token_number: i32, status: TokenStatus) -> Self {
        Self {
            token_number: Some(token_number),
            position: None,
            estimated_wait_time: 0,
            status: Some(status),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQueueEntry {
    pub id: Uuid,
    pub token_number: i32,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub status: TokenStatus,
    pub priority: i32,
    pub estimated_wait_time: i32,
    pub created_at: DateTime<Utc>,
    pub patient: Option<PatientName>,
}

impl AdminQueueEntry {
    pub fn from_token(token: &QueueToken, estimated_wait_time: i32) -> Self {
        Self {
            id: token.id,
            token_number: token.token_number,
            patient_id: token.patient_id,
            doctor_id: token.doctor_id,
            status: token.status,
            priority: token.priority,
            estimated_wait_time,
            created_at: token.created_at,
            patient: token.patient.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// REST request/response shapes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTokenRequest {
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub doctor_id: Uuid,
    pub waiting: usize,
    pub being_served: usize,
    pub connected_subscribers: usize,
}
