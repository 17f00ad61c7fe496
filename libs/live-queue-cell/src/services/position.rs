use uuid::Uuid;

use crate::models::{QueueToken, TokenStatus};

/// A waiting token's rank in its doctor's queue and the wait estimate the
/// linear model assigns to that rank.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuePlacement {
    pub token: QueueToken,
    pub position: u32,
    pub estimated_wait_time: i32,
}

/// Rank a doctor's waiting tokens: priority descending, then first come
/// first served within the same priority. Position is 1-based and the wait
/// estimate is `(position - 1) * avg_consultation_minutes`, so the token at
/// the head of the queue always reads zero.
///
/// Tokens that are not in `waiting` status are ignored; an empty waiting set
/// yields an empty ranking.
pub fn rank_waiting_tokens(
    tokens: Vec<QueueToken>,
    avg_consultation_minutes: u32,
) -> Vec<QueuePlacement> {
    let mut waiting: Vec<QueueToken> = tokens
        .into_iter()
        .filter(|token| token.status == TokenStatus::Waiting)
        .collect();

    waiting.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });

    waiting
        .into_iter()
        .enumerate()
        .map(|(index, token)| QueuePlacement {
            position: index as u32 + 1,
            estimated_wait_time: index as i32 * avg_consultation_minutes as i32,
            token,
        })
        .collect()
}

pub fn placement_for_patient(
    placements: &[QueuePlacement],
    patient_id: Uuid,
) -> Option<&QueuePlacement> {
    placements
        .iter()
        .find(|placement| placement.token.patient_id == patient_id)
}
