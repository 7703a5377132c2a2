use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::{appointment_statuses::AppointmentStatus, payment_statuses::PaymentStatus};
use crate::domain::entities::appointments::AppointmentEntity;

/// Minutes a freshly booked appointment waits for payment before the sweep may expire it.
pub const PAYMENT_WINDOW_MINUTES: i64 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounsellorSnapshot {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub expertise: Option<String>,
}

impl CounsellorSnapshot {
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            "your counsellor".to_string()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationSource {
    Verification,
    Webhook,
}

impl ConfirmationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationSource::Verification => "verification",
            ConfirmationSource::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentDetails {
    pub order_id: String,
    pub payment_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub method: Option<String>,
    pub payer_email: Option<String>,
    pub payer_contact: Option<String>,
    pub provider_status: String,
    pub source: ConfirmationSource,
}

/// Partial update of the mutable appointment fields.
///
/// `payment_expires_at` is doubly optional: `Some(None)` clears the deadline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentPatch {
    pub status: Option<AppointmentStatus>,
    pub payment_status: Option<PaymentStatus>,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub payment_signature: Option<String>,
    pub payment_details: Option<Value>,
    pub paid_at: Option<DateTime<Utc>>,
    pub payment_expires_at: Option<Option<DateTime<Utc>>>,
}

impl AppointmentPatch {
    pub fn confirmed(
        details: &PaymentDetails,
        signature: Option<String>,
        paid_at: DateTime<Utc>,
    ) -> Result<Self> {
        let payment_details =
            serde_json::to_value(details).context("failed to encode payment details")?;

        Ok(Self {
            status: Some(AppointmentStatus::Confirmed),
            payment_status: Some(PaymentStatus::Success),
            order_id: Some(details.order_id.clone()),
            payment_id: Some(details.payment_id.clone()),
            payment_signature: signature,
            payment_details: Some(payment_details),
            paid_at: Some(paid_at),
            payment_expires_at: Some(None),
        })
    }

    pub fn expired() -> Self {
        Self {
            status: Some(AppointmentStatus::CancelledExpired),
            payment_status: Some(PaymentStatus::Expired),
            payment_expires_at: Some(None),
            ..Self::default()
        }
    }

    pub fn payment_failed(payment_id: Option<String>) -> Self {
        Self {
            status: Some(AppointmentStatus::PaymentFailed),
            payment_status: Some(PaymentStatus::Failed),
            payment_id,
            ..Self::default()
        }
    }

    pub fn bind_order(order_id: impl Into<String>) -> Self {
        Self {
            order_id: Some(order_id.into()),
            ..Self::default()
        }
    }

    /// Fields set on `other` win.
    pub fn merge(self, other: AppointmentPatch) -> AppointmentPatch {
        AppointmentPatch {
            status: other.status.or(self.status),
            payment_status: other.payment_status.or(self.payment_status),
            order_id: other.order_id.or(self.order_id),
            payment_id: other.payment_id.or(self.payment_id),
            payment_signature: other.payment_signature.or(self.payment_signature),
            payment_details: other.payment_details.or(self.payment_details),
            paid_at: other.paid_at.or(self.paid_at),
            payment_expires_at: other.payment_expires_at.or(self.payment_expires_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == AppointmentPatch::default()
    }

    pub fn apply_to(&self, appointment: &mut AppointmentEntity, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            appointment.status = status.to_string();
        }
        if let Some(payment_status) = self.payment_status {
            appointment.payment_status = payment_status.to_string();
        }
        if let Some(order_id) = &self.order_id {
            appointment.order_id = Some(order_id.clone());
        }
        if let Some(payment_id) = &self.payment_id {
            appointment.payment_id = Some(payment_id.clone());
        }
        if let Some(signature) = &self.payment_signature {
            appointment.payment_signature = Some(signature.clone());
        }
        if let Some(details) = &self.payment_details {
            appointment.payment_details = Some(details.clone());
        }
        if let Some(paid_at) = self.paid_at {
            appointment.paid_at = Some(paid_at);
        }
        if let Some(expires_at) = self.payment_expires_at {
            appointment.payment_expires_at = expires_at;
        }
        appointment.updated_at = now;
    }
}

/// Pending appointment selected by the expiry sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryCandidate {
    pub appointment_id: Uuid,
    pub counsellor_id: Uuid,
    pub student_id: Uuid,
    pub slot_id: String,
}

/// Outcome of the atomic slot reservation + appointment insert.
#[derive(Debug, Clone)]
pub enum ReservationOutcome {
    Reserved(AppointmentEntity),
    SlotMissing,
    SlotAlreadyBooked,
    SlotTupleTaken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderBinding {
    Bound,
    AlreadyBound(String),
}

#[derive(Debug, Clone)]
pub enum ConfirmationOutcome {
    Confirmed(AppointmentEntity),
    AlreadyConfirmed(AppointmentEntity),
    NotPending(AppointmentStatus),
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpirySummary {
    pub expired: usize,
    pub released_slots: usize,
    pub skipped: usize,
}
