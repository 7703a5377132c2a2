#![allow(dead_code)]

use std::sync::Arc;

use booking_core::{
    domain::{
        entities::{appointments::AppointmentEntity, counsellors::CounsellorEntity},
        value_objects::{enums::periods::Period, slot_plan::slot_id},
    },
    infra::db::memory::MemoryStore,
};
use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

pub fn counsellor(exceptions: Value) -> CounsellorEntity {
    let now = Utc::now();
    CounsellorEntity {
        id: Uuid::new_v4(),
        email: format!("counsellor-{}@example.com", Uuid::new_v4().simple()),
        first_name: Some("Meera".to_string()),
        last_name: Some("Iyer".to_string()),
        expertise: Some("Anxiety".to_string()),
        is_verified: true,
        session_price_minor: Some(80_000),
        weekly_schedule: Some(json!({
            "monday": { "morning": true },
            "tuesday": { "morning": true }
        })),
        schedule_exceptions: exceptions,
        time_config: json!({
            "morning": { "start": "09:00", "end": "10:30" },
            "session_duration_minutes": 30
        }),
        created_at: now,
        updated_at: now,
    }
}

pub fn morning_slot_id(counsellor_id: Uuid, start: &str) -> String {
    slot_id(
        counsellor_id,
        monday(),
        Period::Morning,
        NaiveTime::parse_from_str(start, "%H:%M").unwrap(),
    )
}

/// Marks the generated slot as booked by `student_id`.
pub async fn book_slot(store: &Arc<MemoryStore>, slot_id: &str, student_id: Uuid) {
    let mut slot = store.slot(slot_id).await.expect("slot was generated");
    slot.is_booked = true;
    slot.booked_by = Some(student_id);
    slot.booked_at = Some(Utc::now());
    store.insert_slot(slot).await;
}

pub fn pending_appointment(
    counsellor_id: Uuid,
    student_id: Uuid,
    slot_id: &str,
    time_slot: &str,
) -> AppointmentEntity {
    let now = Utc::now();
    AppointmentEntity {
        id: Uuid::new_v4(),
        counsellor_id,
        student_id,
        student_email: Some("student@example.com".to_string()),
        counsellor_snapshot: json!({ "name": "Meera Iyer" }),
        date: monday(),
        time_slot: time_slot.to_string(),
        slot_id: slot_id.to_string(),
        meeting_id: format!("mtg-{}", Uuid::new_v4().simple()),
        join_url: "https://zoom.example/j/1".to_string(),
        start_url: "https://zoom.example/s/1".to_string(),
        amount_minor: 80_000,
        currency: "INR".to_string(),
        meta: json!({}),
        status: "pending_payment".to_string(),
        payment_status: "pending".to_string(),
        payment_expires_at: Some(now + Duration::minutes(15)),
        order_id: None,
        payment_id: None,
        payment_signature: None,
        payment_details: None,
        paid_at: None,
        created_at: now,
        updated_at: now,
    }
}
