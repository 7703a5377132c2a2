mod common;

use std::sync::{Arc, atomic::Ordering};

use backend::usecases::{ReasonedError, bookings::BookingError};
use booking_core::domain::value_objects::{
    clock::parse_clock, enums::periods::Period, slot_plan::slot_id,
};
use common::{
    FakeMeetings, booking_request, bookings, monday, principal_for, seeded_store, student,
};

fn morning_slot_id(counsellor_id: uuid::Uuid, start: &str) -> String {
    slot_id(counsellor_id, monday(), Period::Morning, parse_clock(start).unwrap())
}

#[tokio::test]
async fn booking_reserves_slot_and_writes_both_mirrors() {
    let (store, counsellor, learner) = seeded_store(50_000).await;
    let meetings = Arc::new(FakeMeetings::default());

    let appointment = bookings(&store, Arc::clone(&meetings))
        .book(&principal_for(&learner), booking_request(counsellor.id, "09:00-09:30"))
        .await
        .unwrap();

    assert_eq!(appointment.status, "pending_payment");
    assert_eq!(appointment.amount_minor, 50_000);
    assert_eq!(meetings.calls.load(Ordering::SeqCst), 1);

    let slot = store
        .slot(&morning_slot_id(counsellor.id, "09:00"))
        .await
        .unwrap();
    assert!(slot.is_booked);
    assert_eq!(slot.booked_by, Some(learner.id));

    let counsellor_copy = store
        .counsellor_mirror(counsellor.id, appointment.id)
        .await
        .unwrap();
    let student_copy = store.student_mirror(learner.id, appointment.id).await.unwrap();
    assert_eq!(counsellor_copy, appointment);
    assert_eq!(student_copy, appointment);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_bookings_of_one_slot_have_a_single_winner() {
    let (store, counsellor, _) = seeded_store(50_000).await;
    let usecase = Arc::new(bookings(&store, Arc::new(FakeMeetings::default())));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let learner = student();
        store.insert_student(learner.clone()).await;
        let usecase = Arc::clone(&usecase);
        let counsellor_id = counsellor.id;
        handles.push(tokio::spawn(async move {
            usecase
                .book(&principal_for(&learner), booking_request(counsellor_id, "09:45-10:15"))
                .await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert_eq!(err.reason(), "slot_already_booked"),
        }
    }

    assert_eq!(winners, 1);
    assert_eq!(store.appointment_count().await, 1);
}

#[tokio::test]
async fn meeting_failure_books_nothing() {
    let (store, counsellor, learner) = seeded_store(50_000).await;
    let meetings = Arc::new(FakeMeetings {
        fail: true,
        ..FakeMeetings::default()
    });

    let err = bookings(&store, meetings)
        .book(&principal_for(&learner), booking_request(counsellor.id, "09:00-09:30"))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::MeetingFailed(_)));
    assert_eq!(store.appointment_count().await, 0);
    let slot = store
        .slot(&morning_slot_id(counsellor.id, "09:00"))
        .await
        .unwrap();
    assert!(!slot.is_booked);
}

#[tokio::test]
async fn range_that_does_not_match_a_stored_slot_is_not_found() {
    let (store, counsellor, learner) = seeded_store(50_000).await;

    let err = bookings(&store, Arc::new(FakeMeetings::default()))
        .book(&principal_for(&learner), booking_request(counsellor.id, "09:00-09:45"))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "slot_not_found");
}

#[tokio::test]
async fn second_booking_of_a_taken_slot_is_rejected() {
    let (store, counsellor, learner) = seeded_store(50_000).await;
    let usecase = bookings(&store, Arc::new(FakeMeetings::default()));
    usecase
        .book(&principal_for(&learner), booking_request(counsellor.id, "09:00-09:30"))
        .await
        .unwrap();

    let other = student();
    store.insert_student(other.clone()).await;
    let err = usecase
        .book(&principal_for(&other), booking_request(counsellor.id, "09:00-09:30"))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::SlotAlreadyBooked));
    assert_eq!(store.appointment_count().await, 1);
}
