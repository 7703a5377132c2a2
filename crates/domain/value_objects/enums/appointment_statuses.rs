use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    PendingPayment,
    Confirmed,
    CancelledExpired,
    PaymentFailed,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::PendingPayment => "pending_payment",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::CancelledExpired => "cancelled_expired",
            AppointmentStatus::PaymentFailed => "payment_failed",
        }
    }

    /// Unknown values map to `None` so callers can treat the record as malformed.
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "pending_payment" => Some(AppointmentStatus::PendingPayment),
            "confirmed" => Some(AppointmentStatus::Confirmed),
            "cancelled_expired" => Some(AppointmentStatus::CancelledExpired),
            "payment_failed" => Some(AppointmentStatus::PaymentFailed),
            _ => None,
        }
    }

    /// Statuses that still hold their counsellor/date/slot tuple.
    pub fn occupies_slot(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::PendingPayment | AppointmentStatus::Confirmed
        )
    }

    pub fn occupying_values() -> [&'static str; 2] {
        [
            AppointmentStatus::PendingPayment.as_str(),
            AppointmentStatus::Confirmed.as_str(),
        ]
    }
}

impl Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
