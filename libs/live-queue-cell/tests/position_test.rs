use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use live_queue_cell::models::{QueueToken, TokenStatus, PRIORITY_EMERGENCY, PRIORITY_NORMAL};
use live_queue_cell::services::position::{placement_for_patient, rank_waiting_tokens};

const AVG_MINUTES: u32 = 15;

fn waiting_token(
    doctor_id: Uuid,
    token_number: i32,
    priority: i32,
    created_at: DateTime<Utc>,
) -> QueueToken {
    QueueToken {
        id: Uuid::new_v4(),
        token_number,
        patient_id: Uuid::new_v4(),
        doctor_id,
        appointment_id: None,
        status: TokenStatus::Waiting,
        priority,
        estimated_wait_time: 0,
        called_at: None,
        completed_at: None,
        created_at,
        patient: None,
    }
}

#[test]
fn test_empty_waiting_set_yields_empty_ranking() {
    let placements = rank_waiting_tokens(vec![], AVG_MINUTES);
    assert!(placements.is_empty(), "no waiting tokens should rank to nothing");
}

#[test]
fn test_positions_are_a_strict_ranking() {
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let tokens: Vec<QueueToken> = (0..6)
        .map(|i| waiting_token(doctor_id, i + 1, PRIORITY_NORMAL, t0 + Duration::minutes(i as i64)))
        .collect();

    let placements = rank_waiting_tokens(tokens, AVG_MINUTES);

    let positions: Vec<u32> = placements.iter().map(|p| p.position).collect();
    assert_eq!(
        positions,
        vec![1, 2, 3, 4, 5, 6],
        "positions must be 1..N with no gaps or duplicates"
    );
}

#[test]
fn test_wait_time_is_linear_in_position() {
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let tokens: Vec<QueueToken> = (0..4)
        .map(|i| waiting_token(doctor_id, i + 1, PRIORITY_NORMAL, t0 + Duration::minutes(i as i64)))
        .collect();

    let placements = rank_waiting_tokens(tokens, AVG_MINUTES);

    for placement in &placements {
        assert_eq!(
            placement.estimated_wait_time,
            (placement.position as i32 - 1) * AVG_MINUTES as i32,
            "wait must equal (position - 1) * average consultation minutes"
        );
    }
    assert_eq!(placements[0].estimated_wait_time, 0, "the head of the queue waits zero");
}

#[test]
fn test_priority_orders_before_arrival_time() {
    // T1 (normal, t0), T2 (normal, t0+1m), T3 (emergency, t0+2m)
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let t1 = waiting_token(doctor_id, 1, PRIORITY_NORMAL, t0);
    let t2 = waiting_token(doctor_id, 2, PRIORITY_NORMAL, t0 + Duration::minutes(1));
    let t3 = waiting_token(doctor_id, 3, PRIORITY_EMERGENCY, t0 + Duration::minutes(2));

    let placements = rank_waiting_tokens(vec![t1.clone(), t2.clone(), t3.clone()], AVG_MINUTES);

    assert_eq!(placements[0].token.token_number, 3, "emergency goes first");
    assert_eq!(placements[0].position, 1);
    assert_eq!(placements[0].estimated_wait_time, 0);

    assert_eq!(placements[1].token.token_number, 1, "earlier arrival wins within a priority");
    assert_eq!(placements[1].position, 2);
    assert_eq!(placements[1].estimated_wait_time, 15);

    assert_eq!(placements[2].token.token_number, 2);
    assert_eq!(placements[2].position, 3);
    assert_eq!(placements[2].estimated_wait_time, 30);
}

#[test]
fn test_removing_a_token_shifts_only_those_behind_it() {
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let tokens: Vec<QueueToken> = (0..5)
        .map(|i| waiting_token(doctor_id, i + 1, PRIORITY_NORMAL, t0 + Duration::minutes(i as i64)))
        .collect();

    let before = rank_waiting_tokens(tokens.clone(), AVG_MINUTES);

    // Token at position 3 leaves the waiting set.
    let removed_id = before[2].token.id;
    let remaining: Vec<QueueToken> = tokens
        .into_iter()
        .filter(|t| t.id != removed_id)
        .collect();
    let after = rank_waiting_tokens(remaining, AVG_MINUTES);

    for placement in &after {
        let old = before
            .iter()
            .find(|p| p.token.id == placement.token.id)
            .expect("token was ranked before");
        if old.position < 3 {
            assert_eq!(placement.position, old.position, "tokens ahead are unchanged");
        } else {
            assert_eq!(
                placement.position,
                old.position - 1,
                "tokens behind shift up by exactly one"
            );
        }
    }
}

#[test]
fn test_called_token_leaves_the_ranking() {
    // T1 at the head transitions to called; the queue closes the gap.
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let mut t1 = waiting_token(doctor_id, 1, PRIORITY_NORMAL, t0);
    let t2 = waiting_token(doctor_id, 2, PRIORITY_NORMAL, t0 + Duration::minutes(1));
    let t3 = waiting_token(doctor_id, 3, PRIORITY_NORMAL, t0 + Duration::minutes(2));

    t1.status = TokenStatus::Called;
    let placements = rank_waiting_tokens(vec![t1, t2.clone(), t3.clone()], AVG_MINUTES);

    assert_eq!(placements.len(), 2, "a called token is no longer ranked");
    assert_eq!(placements[0].token.id, t2.id);
    assert_eq!(placements[0].position, 1);
    assert_eq!(placements[0].estimated_wait_time, 0);
    assert_eq!(placements[1].token.id, t3.id);
    assert_eq!(placements[1].position, 2);
    assert_eq!(placements[1].estimated_wait_time, 15);
}

#[test]
fn test_placement_lookup_by_patient() {
    let doctor_id = Uuid::new_v4();
    let t0 = Utc::now();
    let t1 = waiting_token(doctor_id, 1, PRIORITY_NORMAL, t0);
    let t2 = waiting_token(doctor_id, 2, PRIORITY_NORMAL, t0 + Duration::minutes(1));
    let wanted = t2.patient_id;

    let placements = rank_waiting_tokens(vec![t1, t2], AVG_MINUTES);

    let placement = placement_for_patient(&placements, wanted)
        .expect("patient with a waiting token should be found");
    assert_eq!(placement.position, 2);

    assert!(
        placement_for_patient(&placements, Uuid::new_v4()).is_none(),
        "an unknown patient has no placement"
    );
}
