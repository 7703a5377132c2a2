use std::sync::Arc;

use anyhow::Context;
use axum::http::StatusCode;
use booking_core::domain::{
    entities::{appointments::AppointmentEntity, time_slots::TimeSlotEntity},
    repositories::{
        appointments::AppointmentRepository, counsellors::CounsellorRepository,
        meetings::MeetingLinkProvider, students::StudentRepository,
        time_slots::TimeSlotRepository,
    },
    value_objects::{
        appointments::{PAYMENT_WINDOW_MINUTES, ReservationOutcome},
        clock::{PlatformClock, parse_date},
        enums::{appointment_statuses::AppointmentStatus, payment_statuses::PaymentStatus},
        meetings::{DEFAULT_MEETING_TOPIC, MeetingRequest},
        principal::Principal,
        time_slots::TimeSlotRange,
    },
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Clone, Deserialize)]
pub struct BookingRequest {
    pub counsellor_id: Uuid,
    pub date: String,
    pub time_slot: String,
}

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{0}")]
    InvalidDate(String),
    #[error("{0}")]
    InvalidTimeSlot(String),
    #[error("cannot book a slot in the past")]
    SlotInPast,
    #[error("counsellor not found")]
    CounsellorNotFound,
    #[error("counsellor is not verified")]
    CounsellorNotVerified,
    #[error("counsellor has no valid session price")]
    InvalidSessionPrice,
    #[error("no slot matches this date and time")]
    SlotNotFound,
    #[error("slot is already booked")]
    SlotAlreadyBooked,
    #[error("an appointment already holds this slot")]
    DuplicateAppointment,
    #[error("student profile not found")]
    StudentNotFound,
    #[error("meeting link could not be created")]
    MeetingFailed(#[source] anyhow::Error),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for BookingError {
    fn status_code(&self) -> StatusCode {
        match self {
            BookingError::InvalidDate(_)
            | BookingError::InvalidTimeSlot(_)
            | BookingError::SlotInPast => StatusCode::BAD_REQUEST,
            BookingError::CounsellorNotFound
            | BookingError::SlotNotFound
            | BookingError::StudentNotFound => StatusCode::NOT_FOUND,
            BookingError::CounsellorNotVerified | BookingError::InvalidSessionPrice => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            BookingError::SlotAlreadyBooked | BookingError::DuplicateAppointment => {
                StatusCode::CONFLICT
            }
            BookingError::MeetingFailed(_) => StatusCode::BAD_GATEWAY,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            BookingError::InvalidDate(_) => "invalid_date",
            BookingError::InvalidTimeSlot(_) => "invalid_time_slot",
            BookingError::SlotInPast => "slot_in_past",
            BookingError::CounsellorNotFound => "counsellor_not_found",
            BookingError::CounsellorNotVerified => "counsellor_not_verified",
            BookingError::InvalidSessionPrice => "invalid_session_price",
            BookingError::SlotNotFound => "slot_not_found",
            BookingError::SlotAlreadyBooked => "slot_already_booked",
            BookingError::DuplicateAppointment => "duplicate_appointment",
            BookingError::StudentNotFound => "student_not_found",
            BookingError::MeetingFailed(_) => "meeting_creation_failed",
            BookingError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, BookingError>;

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub currency: String,
    pub meeting_host_email: String,
}

pub struct BookingUseCase<C, S, T, A, M>
where
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
    A: AppointmentRepository + Send + Sync + 'static,
    M: MeetingLinkProvider + Send + Sync + 'static,
{
    counsellor_repo: Arc<C>,
    student_repo: Arc<S>,
    slot_repo: Arc<T>,
    appointment_repo: Arc<A>,
    meetings: Arc<M>,
    clock: PlatformClock,
    settings: BookingSettings,
}

impl<C, S, T, A, M> BookingUseCase<C, S, T, A, M>
where
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
    A: AppointmentRepository + Send + Sync + 'static,
    M: MeetingLinkProvider + Send + Sync + 'static,
{
    pub fn new(
        counsellor_repo: Arc<C>,
        student_repo: Arc<S>,
        slot_repo: Arc<T>,
        appointment_repo: Arc<A>,
        meetings: Arc<M>,
        clock: PlatformClock,
        settings: BookingSettings,
    ) -> Self {
        Self {
            counsellor_repo,
            student_repo,
            slot_repo,
            appointment_repo,
            meetings,
            clock,
            settings,
        }
    }

    fn parse_request(&self, request: &BookingRequest) -> UseCaseResult<(NaiveDate, TimeSlotRange)> {
        let date = parse_date(&request.date).map_err(|err| BookingError::InvalidDate(err.to_string()))?;
        let range = TimeSlotRange::parse(&request.time_slot)
            .map_err(|err| BookingError::InvalidTimeSlot(err.to_string()))?;
        Ok((date, range))
    }

    /// Reserves the slot and creates a `pending_payment` appointment with both mirrors in one
    /// atomic write. The meeting is created first; if that fails nothing is written.
    pub async fn book(
        &self,
        principal: &Principal,
        request: BookingRequest,
    ) -> UseCaseResult<AppointmentEntity> {
        let counsellor_id = request.counsellor_id;
        let student_id = principal.id;
        let (date, range) = self.parse_request(&request)?;

        if date.and_time(range.start) <= self.clock.now_local() {
            return Err(BookingError::SlotInPast);
        }

        let counsellor = self
            .counsellor_repo
            .find_by_id(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "bookings: failed to load counsellor");
                BookingError::Internal(err)
            })?
            .ok_or(BookingError::CounsellorNotFound)?;
        if !counsellor.is_verified {
            return Err(BookingError::CounsellorNotVerified);
        }
        let amount_minor = counsellor
            .valid_session_price()
            .ok_or(BookingError::InvalidSessionPrice)?;

        let slot = self.matching_slot(counsellor_id, date, range).await?;
        if slot.is_booked {
            return Err(BookingError::SlotAlreadyBooked);
        }
        let time_slot = slot.range().label();

        let holder = self
            .appointment_repo
            .find_active_for_slot(counsellor_id, date, time_slot.clone())
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "bookings: failed to check existing appointments");
                BookingError::Internal(err)
            })?;
        if let Some(existing) = holder {
            warn!(
                conflict = true,
                %counsellor_id,
                %date,
                %time_slot,
                existing_appointment_id = %existing.id,
                "bookings: slot tuple already held by another appointment"
            );
            return Err(BookingError::DuplicateAppointment);
        }

        let (student_email, student_name) = self.student_contact(principal).await?;

        let meeting = self
            .meetings
            .create_meeting(MeetingRequest {
                host_email: self.settings.meeting_host_email.clone(),
                date,
                time_slot: slot.range(),
                topic: DEFAULT_MEETING_TOPIC.to_string(),
            })
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, %time_slot, error = ?err, "bookings: meeting creation failed");
                BookingError::MeetingFailed(err)
            })?;

        let now = Utc::now();
        let appointment = AppointmentEntity {
            id: Uuid::new_v4(),
            counsellor_id,
            student_id,
            student_email: Some(student_email),
            counsellor_snapshot: serde_json::to_value(counsellor.snapshot())
                .context("failed to encode counsellor snapshot")?,
            date,
            time_slot: time_slot.clone(),
            slot_id: slot.id.clone(),
            meeting_id: meeting.meeting_id,
            join_url: meeting.join_url,
            start_url: meeting.start_url,
            amount_minor,
            currency: self.settings.currency.clone(),
            meta: json!({
                "student_name": student_name,
                "counsellor_name": counsellor.display_name(),
                "topic": DEFAULT_MEETING_TOPIC,
            }),
            status: AppointmentStatus::PendingPayment.to_string(),
            payment_status: PaymentStatus::Pending.to_string(),
            payment_expires_at: Some(now + Duration::minutes(PAYMENT_WINDOW_MINUTES)),
            order_id: None,
            payment_id: None,
            payment_signature: None,
            payment_details: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };

        let outcome = self
            .appointment_repo
            .create_with_reservation(appointment)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, %time_slot, db_error = ?err, "bookings: reservation write failed");
                BookingError::Internal(err)
            })?;

        match outcome {
            ReservationOutcome::Reserved(appointment) => {
                info!(
                    appointment_id = %appointment.id,
                    %counsellor_id,
                    %student_id,
                    %date,
                    %time_slot,
                    amount_minor,
                    "bookings: slot reserved, awaiting payment"
                );
                Ok(appointment)
            }
            ReservationOutcome::SlotMissing => Err(BookingError::SlotNotFound),
            ReservationOutcome::SlotAlreadyBooked => {
                warn!(conflict = true, %counsellor_id, %date, %time_slot, "bookings: lost booking race");
                Err(BookingError::SlotAlreadyBooked)
            }
            ReservationOutcome::SlotTupleTaken => {
                warn!(conflict = true, %counsellor_id, %date, %time_slot, "bookings: tuple taken at write time");
                Err(BookingError::DuplicateAppointment)
            }
        }
    }

    async fn matching_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        range: TimeSlotRange,
    ) -> UseCaseResult<TimeSlotEntity> {
        let slot = self
            .slot_repo
            .find_slot(counsellor_id, date, range.start)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "bookings: failed to load slot");
                BookingError::Internal(err)
            })?
            .ok_or(BookingError::SlotNotFound)?;

        if slot.end_time != range.end {
            info!(
                %counsellor_id,
                %date,
                requested = %range.label(),
                stored = %slot.range().label(),
                "bookings: requested range does not match stored slot"
            );
            return Err(BookingError::SlotNotFound);
        }
        Ok(slot)
    }

    async fn student_contact(&self, principal: &Principal) -> UseCaseResult<(String, String)> {
        let student = self
            .student_repo
            .find_by_id(principal.id)
            .await
            .map_err(|err| {
                error!(student_id = %principal.id, db_error = ?err, "bookings: failed to load student");
                BookingError::Internal(err)
            })?;

        match (student, principal.email.clone()) {
            (Some(student), _) => Ok((student.email.clone(), student.display_name())),
            (None, Some(email)) => Ok((email.clone(), email)),
            (None, None) => Err(BookingError::StudentNotFound),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use booking_core::domain::{
        entities::counsellors::CounsellorEntity,
        repositories::{
            appointments::MockAppointmentRepository, counsellors::MockCounsellorRepository,
            meetings::MockMeetingLinkProvider, students::MockStudentRepository,
            time_slots::MockTimeSlotRepository,
        },
        value_objects::{clock::parse_clock, enums::roles::Role, meetings::MeetingLink},
    };

    struct Mocks {
        counsellors: MockCounsellorRepository,
        students: MockStudentRepository,
        slots: MockTimeSlotRepository,
        appointments: MockAppointmentRepository,
        meetings: MockMeetingLinkProvider,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                counsellors: MockCounsellorRepository::new(),
                students: MockStudentRepository::new(),
                slots: MockTimeSlotRepository::new(),
                appointments: MockAppointmentRepository::new(),
                meetings: MockMeetingLinkProvider::new(),
            }
        }

        fn build(
            self,
        ) -> BookingUseCase<
            MockCounsellorRepository,
            MockStudentRepository,
            MockTimeSlotRepository,
            MockAppointmentRepository,
            MockMeetingLinkProvider,
        > {
            BookingUseCase::new(
                Arc::new(self.counsellors),
                Arc::new(self.students),
                Arc::new(self.slots),
                Arc::new(self.appointments),
                Arc::new(self.meetings),
                PlatformClock::utc(),
                BookingSettings {
                    currency: "INR".to_string(),
                    meeting_host_email: "host@example.com".to_string(),
                },
            )
        }
    }

    fn counsellor(id: Uuid, verified: bool, price: Option<i64>) -> CounsellorEntity {
        let now = Utc::now();
        CounsellorEntity {
            id,
            email: "dev@example.com".to_string(),
            first_name: Some("Dev".to_string()),
            last_name: Some("Mehta".to_string()),
            expertise: None,
            is_verified: verified,
            session_price_minor: price,
            weekly_schedule: None,
            schedule_exceptions: json!({}),
            time_config: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    fn slot(counsellor_id: Uuid, booked: bool) -> TimeSlotEntity {
        TimeSlotEntity {
            id: format!("{counsellor_id}_2030-01-07_morning_09:00"),
            counsellor_id,
            date: NaiveDate::from_ymd_opt(2030, 1, 7).unwrap(),
            period: "morning".to_string(),
            start_time: parse_clock("09:00").unwrap(),
            end_time: parse_clock("09:30").unwrap(),
            is_booked: booked,
            booked_by: None,
            booked_at: None,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn student() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            email: Some("asha@example.com".to_string()),
            role: Role::Student,
        }
    }

    fn request(counsellor_id: Uuid) -> BookingRequest {
        BookingRequest {
            counsellor_id,
            date: "2030-01-07".to_string(),
            time_slot: "09:00-09:30".to_string(),
        }
    }

    fn with_counsellor(mocks: &mut Mocks, counsellor: CounsellorEntity) {
        mocks.counsellors.expect_find_by_id().returning(move |_| {
            let counsellor = counsellor.clone();
            Box::pin(async move { Ok(Some(counsellor)) })
        });
    }

    fn with_slot(mocks: &mut Mocks, slot: TimeSlotEntity) {
        mocks.slots.expect_find_slot().returning(move |_, _, _| {
            let slot = slot.clone();
            Box::pin(async move { Ok(Some(slot)) })
        });
    }

    #[tokio::test]
    async fn malformed_inputs_fail_before_any_io() {
        let usecase = Mocks::new().build();

        let mut bad_date = request(Uuid::new_v4());
        bad_date.date = "07-01-2030".to_string();
        let err = usecase.book(&student(), bad_date).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_date");

        let mut bad_slot = request(Uuid::new_v4());
        bad_slot.time_slot = "09:30-09:00".to_string();
        let err = usecase.book(&student(), bad_slot).await.unwrap_err();
        assert_eq!(err.reason(), "invalid_time_slot");

        let mut past = request(Uuid::new_v4());
        past.date = "2020-01-06".to_string();
        let err = usecase.book(&student(), past).await.unwrap_err();
        assert_eq!(err.reason(), "slot_in_past");
    }

    #[tokio::test]
    async fn unverified_or_unpriced_counsellor_is_rejected() {
        let counsellor_id = Uuid::new_v4();

        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, false, Some(50_000)));
        let err = mocks.build().book(&student(), request(counsellor_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::CounsellorNotVerified));

        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, true, Some(0)));
        let err = mocks.build().book(&student(), request(counsellor_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::InvalidSessionPrice));
    }

    #[tokio::test]
    async fn booked_slot_is_rejected_without_meeting() {
        let counsellor_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, true, Some(50_000)));
        with_slot(&mut mocks, slot(counsellor_id, true));
        mocks.meetings.expect_create_meeting().never();
        mocks.appointments.expect_create_with_reservation().never();

        let err = mocks.build().book(&student(), request(counsellor_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotAlreadyBooked));
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn meeting_failure_writes_nothing() {
        let counsellor_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, true, Some(50_000)));
        with_slot(&mut mocks, slot(counsellor_id, false));
        mocks
            .appointments
            .expect_find_active_for_slot()
            .returning(|_, _, _| Box::pin(async { Ok(None) }));
        mocks
            .students
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        mocks
            .meetings
            .expect_create_meeting()
            .returning(|_| Box::pin(async { Err(anyhow!("zoom down")) }));
        mocks.appointments.expect_create_with_reservation().never();

        let err = mocks.build().book(&student(), request(counsellor_id)).await.unwrap_err();
        assert_eq!(err.reason(), "meeting_creation_failed");
    }

    #[tokio::test]
    async fn successful_booking_is_pending_with_deadline() {
        let counsellor_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, true, Some(50_000)));
        with_slot(&mut mocks, slot(counsellor_id, false));
        mocks
            .appointments
            .expect_find_active_for_slot()
            .returning(|_, _, _| Box::pin(async { Ok(None) }));
        mocks
            .students
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        mocks.meetings.expect_create_meeting().returning(|request| {
            assert_eq!(request.host_email, "host@example.com");
            Box::pin(async {
                Ok(MeetingLink {
                    meeting_id: "123".to_string(),
                    join_url: "https://zoom.example.com/j/123".to_string(),
                    start_url: "https://zoom.example.com/s/123".to_string(),
                })
            })
        });
        mocks
            .appointments
            .expect_create_with_reservation()
            .times(1)
            .returning(|appointment| Box::pin(async move { Ok(ReservationOutcome::Reserved(appointment)) }));

        let appointment = mocks.build().book(&student(), request(counsellor_id)).await.unwrap();

        assert_eq!(appointment.status, "pending_payment");
        assert_eq!(appointment.payment_status, "pending");
        assert_eq!(appointment.amount_minor, 50_000);
        assert_eq!(appointment.time_slot, "09:00-09:30");
        assert_eq!(appointment.student_email.as_deref(), Some("asha@example.com"));
        let window = appointment.payment_expires_at.unwrap() - appointment.created_at;
        assert_eq!(window, Duration::minutes(PAYMENT_WINDOW_MINUTES));
    }

    #[tokio::test]
    async fn losing_the_write_race_reports_already_booked() {
        let counsellor_id = Uuid::new_v4();
        let mut mocks = Mocks::new();
        with_counsellor(&mut mocks, counsellor(counsellor_id, true, Some(50_000)));
        with_slot(&mut mocks, slot(counsellor_id, false));
        mocks
            .appointments
            .expect_find_active_for_slot()
            .returning(|_, _, _| Box::pin(async { Ok(None) }));
        mocks
            .students
            .expect_find_by_id()
            .returning(|_| Box::pin(async { Ok(None) }));
        mocks.meetings.expect_create_meeting().returning(|_| {
            Box::pin(async {
                Ok(MeetingLink {
                    meeting_id: "1".to_string(),
                    join_url: "j".to_string(),
                    start_url: "s".to_string(),
                })
            })
        });
        mocks
            .appointments
            .expect_create_with_reservation()
            .returning(|_| Box::pin(async { Ok(ReservationOutcome::SlotAlreadyBooked) }));

        let err = mocks.build().book(&student(), request(counsellor_id)).await.unwrap_err();
        assert!(matches!(err, BookingError::SlotAlreadyBooked));
    }
}
