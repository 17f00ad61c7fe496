use std::sync::Arc;

use tokio::time::{timeout, Duration};
use uuid::Uuid;

use live_queue_cell::models::{AdminQueueEntry, QueuePositionPayload, ServerMessage, TokenStatus};
use live_queue_cell::services::broadcast::{QueueBroadcastService, SubscriptionScope};

fn admin_entry(doctor_id: Uuid, token_number: i32) -> AdminQueueEntry {
    AdminQueueEntry {
        id: Uuid::new_v4(),
        token_number,
        patient_id: Uuid::new_v4(),
        doctor_id,
        status: TokenStatus::Waiting,
        priority: 1,
        estimated_wait_time: 0,
        created_at: chrono::Utc::now(),
        patient: None,
    }
}

#[tokio::test]
async fn test_register_and_remove_connection() {
    let broadcast = QueueBroadcastService::new();
    let connection_id = Uuid::new_v4();

    assert_eq!(broadcast.connection_count().await, 0, "registry starts empty");

    let _receiver = broadcast.register(connection_id).await;
    assert_eq!(broadcast.connection_count().await, 1, "registered connection is tracked");

    broadcast.remove(connection_id).await;
    assert_eq!(broadcast.connection_count().await, 0, "removed connection is gone");
}

#[tokio::test]
async fn test_set_scope_replaces_previous_scope() {
    let broadcast = QueueBroadcastService::new();
    let connection_id = Uuid::new_v4();
    let _receiver = broadcast.register(connection_id).await;

    let first = SubscriptionScope::Patient(Uuid::new_v4());
    let second = SubscriptionScope::Admin { doctor_id: None };

    assert!(broadcast.set_scope(connection_id, first).await);
    assert_eq!(broadcast.scope_of(connection_id).await, Some(first));

    assert!(broadcast.set_scope(connection_id, second).await);
    assert_eq!(
        broadcast.scope_of(connection_id).await,
        Some(second),
        "a new subscribe replaces the old scope"
    );
    assert_eq!(
        broadcast.connection_count().await,
        1,
        "re-subscribing must not duplicate the registry entry"
    );
}

#[tokio::test]
async fn test_set_scope_on_unknown_connection() {
    let broadcast = QueueBroadcastService::new();
    let unknown = Uuid::new_v4();

    assert!(
        !broadcast.set_scope(unknown, SubscriptionScope::Admin { doctor_id: None }).await,
        "scoping an unregistered connection reports failure"
    );
}

#[tokio::test]
async fn test_position_updates_reach_only_matching_patient_scope() {
    let broadcast = QueueBroadcastService::new();
    let patient_id = Uuid::new_v4();

    let subscriber = Uuid::new_v4();
    let mut subscriber_rx = broadcast.register(subscriber).await;
    broadcast
        .set_scope(subscriber, SubscriptionScope::Patient(patient_id))
        .await;

    let bystander = Uuid::new_v4();
    let mut bystander_rx = broadcast.register(bystander).await;
    broadcast
        .set_scope(bystander, SubscriptionScope::Patient(Uuid::new_v4()))
        .await;

    broadcast
        .publish_position(patient_id, QueuePositionPayload::waiting(5, 2, 15))
        .await;

    let received = timeout(Duration::from_secs(1), subscriber_rx.recv())
        .await
        .expect("matching subscriber should receive the update")
        .expect("channel should be open");
    match received {
        ServerMessage::QueuePosition { data } => {
            assert_eq!(data.token_number, Some(5));
            assert_eq!(data.position, Some(2));
            assert_eq!(data.estimated_wait_time, 15);
        }
        other => panic!("expected a queue_position message, got {:?}", other),
    }

    let nothing = timeout(Duration::from_millis(100), bystander_rx.recv()).await;
    assert!(nothing.is_err(), "other patients' subscribers must see nothing");
}

#[tokio::test]
async fn test_admin_updates_respect_doctor_scoping() {
    let broadcast = QueueBroadcastService::new();
    let doctor_a = Uuid::new_v4();
    let doctor_b = Uuid::new_v4();

    let scoped = Uuid::new_v4();
    let mut scoped_rx = broadcast.register(scoped).await;
    broadcast
        .set_scope(scoped, SubscriptionScope::Admin { doctor_id: Some(doctor_a) })
        .await;

    let clinic_wide = Uuid::new_v4();
    let mut clinic_rx = broadcast.register(clinic_wide).await;
    broadcast
        .set_scope(clinic_wide, SubscriptionScope::Admin { doctor_id: None })
        .await;

    broadcast.publish_admin(doctor_b, vec![admin_entry(doctor_b, 1)]).await;

    let clinic_msg = timeout(Duration::from_secs(1), clinic_rx.recv())
        .await
        .expect("clinic-wide admin should see every doctor")
        .expect("channel should be open");
    assert!(
        matches!(clinic_msg, ServerMessage::AdminQueueUpdate { .. }),
        "clinic-wide admin receives admin updates"
    );

    let nothing = timeout(Duration::from_millis(100), scoped_rx.recv()).await;
    assert!(
        nothing.is_err(),
        "an admin scoped to doctor A must not see doctor B's queue"
    );

    broadcast.publish_admin(doctor_a, vec![admin_entry(doctor_a, 1)]).await;
    let scoped_msg = timeout(Duration::from_secs(1), scoped_rx.recv())
        .await
        .expect("scoped admin should see its own doctor")
        .expect("channel should be open");
    assert!(matches!(scoped_msg, ServerMessage::AdminQueueUpdate { .. }));
}

#[tokio::test]
async fn test_updates_are_delivered_in_publish_order() {
    let broadcast = QueueBroadcastService::new();
    let patient_id = Uuid::new_v4();

    let connection_id = Uuid::new_v4();
    let mut receiver = broadcast.register(connection_id).await;
    broadcast
        .set_scope(connection_id, SubscriptionScope::Patient(patient_id))
        .await;

    for position in 1..=5u32 {
        broadcast
            .publish_position(
                patient_id,
                QueuePositionPayload::waiting(1, position, (position as i32 - 1) * 15),
            )
            .await;
    }

    for expected in 1..=5u32 {
        let message = timeout(Duration::from_secs(1), receiver.recv())
            .await
            .expect("update should arrive")
            .expect("channel should be open");
        match message {
            ServerMessage::QueuePosition { data } => assert_eq!(
                data.position,
                Some(expected),
                "updates must arrive in the order they were published"
            ),
            other => panic!("expected a queue_position message, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_dead_connection_is_evicted_without_disturbing_others() {
    let broadcast = QueueBroadcastService::new();
    let patient_id = Uuid::new_v4();

    let dead = Uuid::new_v4();
    let dead_rx = broadcast.register(dead).await;
    broadcast.set_scope(dead, SubscriptionScope::Patient(patient_id)).await;
    drop(dead_rx);

    let alive = Uuid::new_v4();
    let mut alive_rx = broadcast.register(alive).await;
    broadcast.set_scope(alive, SubscriptionScope::Patient(patient_id)).await;

    broadcast
        .publish_position(patient_id, QueuePositionPayload::waiting(1, 1, 0))
        .await;

    let message = timeout(Duration::from_secs(1), alive_rx.recv())
        .await
        .expect("healthy subscriber should still receive the update")
        .expect("channel should be open");
    assert!(matches!(message, ServerMessage::QueuePosition { .. }));

    assert_eq!(
        broadcast.connection_count().await,
        1,
        "the broken connection should have been dropped from the registry"
    );
}

#[tokio::test]
async fn test_concurrent_registration_and_removal() {
    let broadcast = Arc::new(QueueBroadcastService::new());
    let mut handles = vec![];

    for _ in 0..10 {
        let service = Arc::clone(&broadcast);
        handles.push(tokio::spawn(async move {
            let connection_id = Uuid::new_v4();
            let _receiver = service.register(connection_id).await;
            connection_id
        }));
    }

    let mut ids = vec![];
    for handle in handles {
        ids.push(handle.await.expect("registration task should not panic"));
    }

    assert_eq!(broadcast.connection_count().await, 10, "all connections registered");

    for connection_id in ids {
        broadcast.remove(connection_id).await;
    }
    assert_eq!(broadcast.connection_count().await, 0, "all connections removed");
}
