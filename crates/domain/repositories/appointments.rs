use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::{appointments::AppointmentEntity, payments::PaymentEntity},
    value_objects::appointments::{
        AppointmentPatch, ConfirmationOutcome, ExpiryCandidate, ExpirySummary, OrderBinding,
        ReservationOutcome,
    },
};

#[async_trait]
#[automock]
pub trait AppointmentRepository {
    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<AppointmentEntity>>;

    /// Pending or confirmed appointment already holding this counsellor/date/time tuple.
    async fn find_active_for_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        time_slot: String,
    ) -> Result<Option<AppointmentEntity>>;

    /// One transaction: re-checks the slot, flips it to booked and writes the appointment
    /// with both mirrors.
    async fn create_with_reservation(
        &self,
        appointment: AppointmentEntity,
    ) -> Result<ReservationOutcome>;

    /// First binding wins; a different existing order id is returned as `AlreadyBound`.
    async fn bind_order_id(&self, appointment_id: Uuid, order_id: String) -> Result<OrderBinding>;

    /// Applies `patch` and upserts `payment` only while the appointment is still pending.
    async fn confirm_payment(
        &self,
        appointment_id: Uuid,
        patch: AppointmentPatch,
        payment: PaymentEntity,
    ) -> Result<ConfirmationOutcome>;

    /// Returns false when the appointment was no longer pending.
    async fn mark_payment_failed(&self, appointment_id: Uuid, patch: AppointmentPatch)
    -> Result<bool>;

    async fn list_expired_pending(&self, now: DateTime<Utc>) -> Result<Vec<AppointmentEntity>>;

    /// Expires every still-pending candidate and releases its slot in one transaction.
    async fn expire_batch(
        &self,
        candidates: Vec<ExpiryCandidate>,
        now: DateTime<Utc>,
    ) -> Result<ExpirySummary>;

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<AppointmentEntity>>;

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<AppointmentEntity>>;
}
