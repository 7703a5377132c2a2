use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        appointments::CounsellorSnapshot,
        enums::{appointment_statuses::AppointmentStatus, payment_statuses::PaymentStatus},
    },
    infra::db::postgres::schema::appointments,
};

/// Master appointment record. The same document is mirrored per counsellor and per student.
#[derive(
    Debug, Clone, PartialEq, Serialize, Deserialize, Identifiable, Selectable, Queryable, Insertable,
)]
#[diesel(table_name = appointments)]
pub struct AppointmentEntity {
    pub id: Uuid,
    pub counsellor_id: Uuid,
    pub student_id: Uuid,
    pub student_email: Option<String>,
    pub counsellor_snapshot: serde_json::Value,
    pub date: NaiveDate,
    pub time_slot: String, // HH:MM-HH:MM
    pub slot_id: String,
    pub meeting_id: String,
    pub join_url: String,
    pub start_url: String,
    pub amount_minor: i64,
    pub currency: String,
    pub meta: serde_json::Value,
    pub status: String,
    pub payment_status: String,
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub payment_signature: Option<String>,
    pub payment_details: Option<serde_json::Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentEntity {
    pub fn status(&self) -> Option<AppointmentStatus> {
        AppointmentStatus::from_str(&self.status)
    }

    pub fn payment_state(&self) -> Option<PaymentStatus> {
        PaymentStatus::from_str(&self.payment_status)
    }

    pub fn is_pending_payment(&self) -> bool {
        self.status() == Some(AppointmentStatus::PendingPayment)
    }

    /// A recorded payment id or a successful payment status means the payment was applied.
    pub fn payment_already_applied(&self) -> bool {
        self.status() == Some(AppointmentStatus::Confirmed)
            || self.payment_state() == Some(PaymentStatus::Success)
    }

    pub fn counsellor_profile(&self) -> CounsellorSnapshot {
        serde_json::from_value(self.counsellor_snapshot.clone()).unwrap_or_default()
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.student_id == user_id || self.counsellor_id == user_id
    }
}
