use std::sync::Arc;

use axum::http::StatusCode;
use booking_core::domain::{
    entities::appointments::AppointmentEntity,
    repositories::appointments::AppointmentRepository,
    value_objects::{appointments::CounsellorSnapshot, principal::Principal},
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Error)]
pub enum AppointmentError {
    #[error("appointment not found")]
    NotFound,
    #[error("not allowed to view these appointments")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for AppointmentError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppointmentError::NotFound => StatusCode::NOT_FOUND,
            AppointmentError::Forbidden => StatusCode::FORBIDDEN,
            AppointmentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AppointmentError::NotFound => "appointment_not_found",
            AppointmentError::Forbidden => "forbidden",
            AppointmentError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, AppointmentError>;

/// Appointment as returned to a caller. The host link is only shown to the counsellor and
/// admins; the payment signature is never shown.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppointmentView {
    pub id: Uuid,
    pub counsellor_id: Uuid,
    pub student_id: Uuid,
    pub student_email: Option<String>,
    pub counsellor: CounsellorSnapshot,
    pub date: NaiveDate,
    pub time_slot: String,
    pub meeting_id: String,
    pub join_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_url: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub payment_expires_at: Option<DateTime<Utc>>,
    pub order_id: Option<String>,
    pub payment_id: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AppointmentView {
    pub fn for_viewer(appointment: &AppointmentEntity, viewer: &Principal) -> Self {
        let hosts = viewer.is_admin() || viewer.id == appointment.counsellor_id;
        Self {
            id: appointment.id,
            counsellor_id: appointment.counsellor_id,
            student_id: appointment.student_id,
            student_email: appointment.student_email.clone(),
            counsellor: appointment.counsellor_profile(),
            date: appointment.date,
            time_slot: appointment.time_slot.clone(),
            meeting_id: appointment.meeting_id.clone(),
            join_url: appointment.join_url.clone(),
            start_url: hosts.then(|| appointment.start_url.clone()),
            amount_minor: appointment.amount_minor,
            currency: appointment.currency.clone(),
            status: appointment.status.clone(),
            payment_status: appointment.payment_status.clone(),
            payment_expires_at: appointment.payment_expires_at,
            order_id: appointment.order_id.clone(),
            payment_id: appointment.payment_id.clone(),
            paid_at: appointment.paid_at,
            created_at: appointment.created_at,
        }
    }
}

pub struct AppointmentUseCase<A>
where
    A: AppointmentRepository + Send + Sync + 'static,
{
    appointment_repo: Arc<A>,
}

impl<A> AppointmentUseCase<A>
where
    A: AppointmentRepository + Send + Sync + 'static,
{
    pub fn new(appointment_repo: Arc<A>) -> Self {
        Self { appointment_repo }
    }

    /// The caller's own appointments as a student, newest first.
    pub async fn list_for_student(&self, principal: &Principal) -> UseCaseResult<Vec<AppointmentView>> {
        let student_id = principal.id;
        let appointments = self
            .appointment_repo
            .list_for_student(student_id)
            .await
            .map_err(|err| {
                error!(%student_id, db_error = ?err, "appointments: failed to list student appointments");
                AppointmentError::Internal(err)
            })?;

        info!(%student_id, count = appointments.len(), "appointments: student list loaded");
        Ok(appointments
            .iter()
            .map(|appointment| AppointmentView::for_viewer(appointment, principal))
            .collect())
    }

    pub async fn list_for_counsellor(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
    ) -> UseCaseResult<Vec<AppointmentView>> {
        if !principal.can_manage_counsellor(counsellor_id) {
            return Err(AppointmentError::Forbidden);
        }

        let appointments = self
            .appointment_repo
            .list_for_counsellor(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "appointments: failed to list counsellor appointments");
                AppointmentError::Internal(err)
            })?;

        info!(%counsellor_id, count = appointments.len(), "appointments: counsellor list loaded");
        Ok(appointments
            .iter()
            .map(|appointment| AppointmentView::for_viewer(appointment, principal))
            .collect())
    }

    /// Visible to its student, its counsellor and admins. Others get `NotFound`.
    pub async fn get(&self, principal: &Principal, appointment_id: Uuid) -> UseCaseResult<AppointmentView> {
        let appointment = self
            .appointment_repo
            .find_by_id(appointment_id)
            .await
            .map_err(|err| {
                error!(%appointment_id, db_error = ?err, "appointments: failed to load appointment");
                AppointmentError::Internal(err)
            })?
            .filter(|appointment| principal.is_admin() || appointment.involves(principal.id))
            .ok_or(AppointmentError::NotFound)?;

        Ok(AppointmentView::for_viewer(&appointment, principal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::domain::{
        repositories::appointments::MockAppointmentRepository,
        value_objects::enums::roles::Role,
    };
    use mockall::predicate::eq;

    fn appointment(student_id: Uuid, counsellor_id: Uuid) -> AppointmentEntity {
        let now = Utc::now();
        AppointmentEntity {
            id: Uuid::new_v4(),
            counsellor_id,
            student_id,
            student_email: Some("asha@example.com".to_string()),
            counsellor_snapshot: serde_json::json!({"first_name": "Dev"}),
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            time_slot: "09:00-09:30".to_string(),
            slot_id: "slot".to_string(),
            meeting_id: "m-1".to_string(),
            join_url: "https://zoom.example.com/j/1".to_string(),
            start_url: "https://zoom.example.com/s/1".to_string(),
            amount_minor: 50_000,
            currency: "INR".to_string(),
            meta: serde_json::json!({}),
            status: "confirmed".to_string(),
            payment_status: "success".to_string(),
            payment_expires_at: None,
            order_id: Some("order_1".to_string()),
            payment_id: Some("pay_1".to_string()),
            payment_signature: Some("sig".to_string()),
            payment_details: None,
            paid_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    fn principal(id: Uuid, role: Role) -> Principal {
        Principal {
            id,
            email: None,
            role,
        }
    }

    #[test]
    fn start_url_is_hidden_from_students() {
        let student_id = Uuid::new_v4();
        let counsellor_id = Uuid::new_v4();
        let appointment = appointment(student_id, counsellor_id);

        let student_view =
            AppointmentView::for_viewer(&appointment, &principal(student_id, Role::Student));
        let counsellor_view =
            AppointmentView::for_viewer(&appointment, &principal(counsellor_id, Role::Counsellor));

        assert!(student_view.start_url.is_none());
        assert_eq!(
            counsellor_view.start_url.as_deref(),
            Some("https://zoom.example.com/s/1")
        );
        assert_eq!(student_view.counsellor.first_name.as_deref(), Some("Dev"));
    }

    #[tokio::test]
    async fn strangers_cannot_read_an_appointment() {
        let stored = appointment(Uuid::new_v4(), Uuid::new_v4());
        let appointment_id = stored.id;

        let mut repo = MockAppointmentRepository::new();
        repo.expect_find_by_id()
            .with(eq(appointment_id))
            .returning(move |_| {
                let stored = stored.clone();
                Box::pin(async move { Ok(Some(stored)) })
            });

        let usecase = AppointmentUseCase::new(Arc::new(repo));
        let result = usecase
            .get(&principal(Uuid::new_v4(), Role::Student), appointment_id)
            .await;

        assert!(matches!(result, Err(AppointmentError::NotFound)));
    }

    #[tokio::test]
    async fn counsellor_list_requires_ownership() {
        let mut repo = MockAppointmentRepository::new();
        repo.expect_list_for_counsellor().never();

        let usecase = AppointmentUseCase::new(Arc::new(repo));
        let result = usecase
            .list_for_counsellor(&principal(Uuid::new_v4(), Role::Counsellor), Uuid::new_v4())
            .await;

        assert!(matches!(result, Err(AppointmentError::Forbidden)));
    }
}
