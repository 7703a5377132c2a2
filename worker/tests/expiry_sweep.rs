mod common;

use std::sync::Arc;

use backend::usecases::slot_generation::SlotGenerationUseCase;
use booking_core::{
    domain::{
        repositories::appointments::AppointmentRepository, value_objects::clock::PlatformClock,
    },
    infra::db::memory::MemoryStore,
};
use chrono::{Duration, Utc};
use common::*;
use serde_json::json;
use uuid::Uuid;
use worker::usecases::expire_pending_appointments::ExpirePendingAppointmentsUseCase;

async fn store_with_monday_slots() -> (Arc<MemoryStore>, Uuid) {
    let store = Arc::new(MemoryStore::new());
    let counsellor = counsellor(json!({}));
    let counsellor_id = counsellor.id;
    store.insert_counsellor(counsellor).await;

    SlotGenerationUseCase::new(Arc::clone(&store), Arc::clone(&store), PlatformClock::utc())
        .generate_for_date(counsellor_id, monday())
        .await
        .unwrap();

    (store, counsellor_id)
}

fn sweeper(store: &Arc<MemoryStore>) -> ExpirePendingAppointmentsUseCase {
    let repository: Arc<dyn AppointmentRepository + Send + Sync> = store.clone();
    ExpirePendingAppointmentsUseCase::new(repository)
}

#[tokio::test]
async fn overdue_pending_appointment_is_expired_and_its_slot_released() {
    let (store, counsellor_id) = store_with_monday_slots().await;
    let student_id = Uuid::new_v4();
    let slot = morning_slot_id(counsellor_id, "09:00");
    book_slot(&store, &slot, student_id).await;

    let appointment = pending_appointment(counsellor_id, student_id, &slot, "09:00-09:30");
    let appointment_id = appointment.id;
    store.insert_appointment(appointment).await;
    store
        .set_payment_deadline(appointment_id, Utc::now() - Duration::minutes(1))
        .await;

    let result = sweeper(&store).run(Utc::now()).await.unwrap();

    assert_eq!(result.scanned, 1);
    assert_eq!(result.expired, 1);
    assert_eq!(result.released_slots, 1);

    let expired = store.appointment(appointment_id).await.unwrap();
    assert_eq!(expired.status, "cancelled_expired");
    assert_eq!(expired.payment_status, "expired");
    assert!(expired.payment_expires_at.is_none());

    let mirror = store
        .student_mirror(student_id, appointment_id)
        .await
        .unwrap();
    assert_eq!(mirror.status, "cancelled_expired");

    let released = store.slot(&slot).await.unwrap();
    assert!(!released.is_booked);
    assert!(released.booked_by.is_none());

    let rerun = sweeper(&store).run(Utc::now()).await.unwrap();
    assert_eq!(rerun.scanned, 0);
    assert_eq!(rerun.expired, 0);
}

#[tokio::test]
async fn confirmed_and_not_yet_due_appointments_are_untouched() {
    let (store, counsellor_id) = store_with_monday_slots().await;

    let paid_student = Uuid::new_v4();
    let paid_slot = morning_slot_id(counsellor_id, "09:00");
    book_slot(&store, &paid_slot, paid_student).await;
    let mut confirmed = pending_appointment(counsellor_id, paid_student, &paid_slot, "09:00-09:30");
    confirmed.status = "confirmed".to_string();
    confirmed.payment_status = "success".to_string();
    confirmed.payment_id = Some("pay_1".to_string());
    confirmed.payment_expires_at = Some(Utc::now() - Duration::hours(1));
    let confirmed_id = confirmed.id;
    store.insert_appointment(confirmed).await;

    let waiting_student = Uuid::new_v4();
    let waiting_slot = morning_slot_id(counsellor_id, "09:45");
    book_slot(&store, &waiting_slot, waiting_student).await;
    let waiting = pending_appointment(counsellor_id, waiting_student, &waiting_slot, "09:45-10:15");
    let waiting_id = waiting.id;
    store.insert_appointment(waiting).await;

    let result = sweeper(&store).run(Utc::now()).await.unwrap();

    assert_eq!(result.scanned, 0);
    assert_eq!(store.appointment(confirmed_id).await.unwrap().status, "confirmed");
    assert_eq!(
        store.appointment(waiting_id).await.unwrap().status,
        "pending_payment"
    );
    assert!(store.slot(&paid_slot).await.unwrap().is_booked);
    assert!(store.slot(&waiting_slot).await.unwrap().is_booked);
}

#[tokio::test]
async fn malformed_record_does_not_block_the_batch() {
    let (store, counsellor_id) = store_with_monday_slots().await;

    let broken = pending_appointment(counsellor_id, Uuid::new_v4(), "", "09:00-09:30");
    let broken_id = broken.id;
    store.insert_appointment(broken).await;
    store
        .set_payment_deadline(broken_id, Utc::now() - Duration::minutes(5))
        .await;

    let student_id = Uuid::new_v4();
    let slot = morning_slot_id(counsellor_id, "09:45");
    book_slot(&store, &slot, student_id).await;
    let overdue = pending_appointment(counsellor_id, student_id, &slot, "09:45-10:15");
    let overdue_id = overdue.id;
    store.insert_appointment(overdue).await;
    store
        .set_payment_deadline(overdue_id, Utc::now() - Duration::minutes(1))
        .await;

    let result = sweeper(&store).run(Utc::now()).await.unwrap();

    assert_eq!(result.scanned, 2);
    assert_eq!(result.skipped_malformed, 1);
    assert_eq!(result.malformed_ids, vec![broken_id]);
    assert_eq!(result.expired, 1);
    assert_eq!(
        store.appointment(broken_id).await.unwrap().status,
        "pending_payment"
    );
    assert!(!store.slot(&slot).await.unwrap().is_booked);
}
