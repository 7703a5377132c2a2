use axum::http::StatusCode;

pub mod appointments;
pub mod availability;
pub mod bookings;
pub mod payment_history;
pub mod payments;
pub mod schedule;
pub mod slot_generation;
pub mod time_slots;

/// Use case failure with an HTTP status and a stable, machine-readable reason.
pub trait ReasonedError: std::error::Error {
    fn status_code(&self) -> StatusCode;
    fn reason(&self) -> &'static str;
}
