#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use backend::usecases::{
    bookings::{BookingRequest, BookingSettings, BookingUseCase},
    payments::{PaymentGateway, PaymentSettings, PaymentUseCase},
    slot_generation::SlotGenerationUseCase,
};
use booking_core::{
    domain::{
        entities::{counsellors::CounsellorEntity, students::StudentEntity},
        repositories::meetings::MeetingLinkProvider,
        value_objects::{
            clock::PlatformClock,
            enums::roles::Role,
            meetings::{MeetingLink, MeetingRequest},
            principal::Principal,
        },
    },
    infra::db::memory::MemoryStore,
    payments::razorpay_client::{
        RazorpayOrder, RazorpayPayment, RazorpayWebhookEvent, receipt_for,
    },
};
use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

/// A Monday far enough ahead that every slot on it is in the future.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

pub fn counsellor(price_minor: i64) -> CounsellorEntity {
    let now = Utc::now();
    CounsellorEntity {
        id: Uuid::new_v4(),
        email: "dev.mehta@example.com".to_string(),
        first_name: Some("Dev".to_string()),
        last_name: Some("Mehta".to_string()),
        expertise: Some("Career".to_string()),
        is_verified: true,
        session_price_minor: Some(price_minor),
        weekly_schedule: Some(json!({
            "monday": { "morning": true, "afternoon": false, "evening": false },
            "tuesday": { "morning": true, "afternoon": true, "evening": false }
        })),
        schedule_exceptions: json!({}),
        time_config: json!({
            "morning": { "start": "09:00", "end": "10:30" },
            "afternoon": { "start": "14:00", "end": "15:00" },
            "session_duration_minutes": 30
        }),
        created_at: now,
        updated_at: now,
    }
}

pub fn student() -> StudentEntity {
    StudentEntity {
        id: Uuid::new_v4(),
        email: format!("student-{}@example.com", Uuid::new_v4().simple()),
        first_name: Some("Asha".to_string()),
        last_name: Some("Rao".to_string()),
        created_at: Utc::now(),
    }
}

pub fn principal_for(student: &StudentEntity) -> Principal {
    Principal {
        id: student.id,
        email: Some(student.email.clone()),
        role: Role::Student,
    }
}

pub fn booking_request(counsellor_id: Uuid, time_slot: &str) -> BookingRequest {
    BookingRequest {
        counsellor_id,
        date: monday().to_string(),
        time_slot: time_slot.to_string(),
    }
}

/// Meeting provider that hands out numbered links and records how often it was called.
#[derive(Default)]
pub struct FakeMeetings {
    pub calls: AtomicUsize,
    pub fail: bool,
}

#[async_trait]
impl MeetingLinkProvider for FakeMeetings {
    async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingLink> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("meeting provider unavailable");
        }
        Ok(MeetingLink {
            meeting_id: format!("meeting-{call}"),
            join_url: format!("https://meet.example.com/j/{call}?d={}", request.date),
            start_url: format!("https://meet.example.com/s/{call}"),
        })
    }
}

pub const WEBHOOK_SIGNATURE: &str = "valid-webhook-signature";

pub fn checkout_signature(order_id: &str, payment_id: &str) -> String {
    format!("signed:{order_id}|{payment_id}")
}

/// In-process payment provider: orders and payments live in maps, signatures are predictable.
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<HashMap<String, RazorpayOrder>>,
    payments: Mutex<HashMap<String, RazorpayPayment>>,
    pub captures: AtomicUsize,
}

impl FakeGateway {
    pub fn add_order(&self, appointment_id: Uuid, order_id: &str, amount: i64) {
        self.orders.lock().unwrap().insert(
            order_id.to_string(),
            RazorpayOrder {
                id: order_id.to_string(),
                amount,
                amount_paid: None,
                currency: "INR".to_string(),
                receipt: Some(receipt_for(appointment_id)),
                status: "created".to_string(),
            },
        );
    }

    pub fn add_payment(&self, payment_id: &str, order_id: &str, amount: i64, status: &str) {
        self.payments
            .lock()
            .unwrap()
            .insert(payment_id.to_string(), payment(payment_id, order_id, amount, status));
    }
}

pub fn payment(payment_id: &str, order_id: &str, amount: i64, status: &str) -> RazorpayPayment {
    RazorpayPayment {
        id: payment_id.to_string(),
        order_id: Some(order_id.to_string()),
        amount,
        currency: "INR".to_string(),
        status: status.to_string(),
        method: Some("card".to_string()),
        captured: status == "captured",
        email: None,
        contact: None,
        error_code: None,
        error_description: None,
    }
}

pub fn webhook_body(event: &str, payment: &RazorpayPayment) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": event,
        "payload": {
            "payment": {
                "entity": {
                    "id": payment.id,
                    "order_id": payment.order_id,
                    "amount": payment.amount,
                    "currency": payment.currency,
                    "status": payment.status,
                    "method": payment.method,
                    "captured": payment.captured,
                }
            }
        }
    }))
    .unwrap()
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor: i64,
        currency: String,
        receipt: String,
    ) -> Result<RazorpayOrder> {
        let mut orders = self.orders.lock().unwrap();
        let order = RazorpayOrder {
            id: format!("order_{}", orders.len() + 1),
            amount: amount_minor,
            amount_paid: None,
            currency,
            receipt: Some(receipt),
            status: "created".to_string(),
        };
        orders.insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn fetch_order(&self, order_id: String) -> Result<RazorpayOrder> {
        self.orders
            .lock()
            .unwrap()
            .get(&order_id)
            .cloned()
            .ok_or_else(|| anyhow!("order {order_id} not found"))
    }

    async fn fetch_payment(&self, payment_id: String) -> Result<RazorpayPayment> {
        self.payments
            .lock()
            .unwrap()
            .get(&payment_id)
            .cloned()
            .ok_or_else(|| anyhow!("payment {payment_id} not found"))
    }

    async fn capture_payment(
        &self,
        payment_id: String,
        _amount_minor: i64,
        _currency: String,
    ) -> Result<RazorpayPayment> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(&payment_id)
            .ok_or_else(|| anyhow!("payment {payment_id} not found"))?;
        payment.status = "captured".to_string();
        payment.captured = true;
        Ok(payment.clone())
    }

    fn verify_payment_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<()> {
        if signature == checkout_signature(order_id, payment_id) {
            Ok(())
        } else {
            bail!("invalid payment signature")
        }
    }

    fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<RazorpayWebhookEvent> {
        if signature != WEBHOOK_SIGNATURE {
            bail!("invalid webhook signature");
        }
        Ok(serde_json::from_slice(payload)?)
    }
}

pub fn slot_generation(store: &Arc<MemoryStore>) -> SlotGenerationUseCase<MemoryStore, MemoryStore> {
    SlotGenerationUseCase::new(Arc::clone(store), Arc::clone(store), PlatformClock::utc())
}

pub fn bookings(
    store: &Arc<MemoryStore>,
    meetings: Arc<FakeMeetings>,
) -> BookingUseCase<MemoryStore, MemoryStore, MemoryStore, MemoryStore, FakeMeetings> {
    BookingUseCase::new(
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        meetings,
        PlatformClock::utc(),
        BookingSettings {
            currency: "INR".to_string(),
            meeting_host_email: "host@example.com".to_string(),
        },
    )
}

pub fn payments(
    store: &Arc<MemoryStore>,
    gateway: Arc<FakeGateway>,
) -> PaymentUseCase<MemoryStore, MemoryStore, MemoryStore, FakeGateway> {
    PaymentUseCase::new(
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        gateway,
        PaymentSettings {
            currency: "INR".to_string(),
            key_id: "rzp_test_key".to_string(),
        },
    )
}

/// Store with one counsellor whose Monday slots are generated, plus one student.
pub async fn seeded_store(price_minor: i64) -> (Arc<MemoryStore>, CounsellorEntity, StudentEntity) {
    let store = Arc::new(MemoryStore::new());
    let counsellor = counsellor(price_minor);
    let student = student();
    store.insert_counsellor(counsellor.clone()).await;
    store.insert_student(student.clone()).await;

    slot_generation(&store)
        .generate_for_date(counsellor.id, monday())
        .await
        .unwrap();

    (store, counsellor, student)
}
