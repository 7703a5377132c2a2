use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use booking_core::{
    domain::{
        repositories::{
            appointments::AppointmentRepository, counsellors::CounsellorRepository,
            meetings::MeetingLinkProvider, students::StudentRepository,
            time_slots::TimeSlotRepository,
        },
        value_objects::clock::PlatformClock,
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{
            appointments::AppointmentPostgres, counsellors::CounsellorPostgres,
            students::StudentPostgres, time_slots::TimeSlotPostgres,
        },
    },
    meetings::zoom_client::ZoomClient,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{
        appointments::{AppointmentUseCase, AppointmentView},
        bookings::{BookingRequest, BookingSettings, BookingUseCase},
    },
};

pub fn routes(
    db_pool: Arc<PgPoolSquad>,
    clock: PlatformClock,
    meetings: Arc<ZoomClient>,
    settings: BookingSettings,
) -> Router {
    let appointment_repository = Arc::new(AppointmentPostgres::new(Arc::clone(&db_pool)));

    let booking_usecase = BookingUseCase::new(
        Arc::new(CounsellorPostgres::new(Arc::clone(&db_pool))),
        Arc::new(StudentPostgres::new(Arc::clone(&db_pool))),
        Arc::new(TimeSlotPostgres::new(Arc::clone(&db_pool))),
        Arc::clone(&appointment_repository),
        meetings,
        clock,
        settings,
    );
    let appointment_usecase = AppointmentUseCase::new(appointment_repository);

    let booking = Router::new()
        .route("/", post(book))
        .with_state(Arc::new(booking_usecase));

    let listing = Router::new()
        .route("/mine", get(list_mine))
        .route("/counsellor/:counsellor_id", get(list_for_counsellor))
        .route("/:appointment_id", get(get_appointment))
        .with_state(Arc::new(appointment_usecase));

    booking.merge(listing)
}

pub async fn book<C, S, T, A, M>(
    State(usecase): State<Arc<BookingUseCase<C, S, T, A, M>>>,
    auth: AuthUser,
    Json(request): Json<BookingRequest>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
    S: StudentRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
    A: AppointmentRepository + Send + Sync + 'static,
    M: MeetingLinkProvider + Send + Sync + 'static,
{
    info!(
        user_id = %auth.user_id,
        counsellor_id = %request.counsellor_id,
        date = %request.date,
        time_slot = %request.time_slot,
        "bookings: booking request received"
    );
    let principal = auth.principal();
    match usecase.book(&principal, request).await {
        Ok(appointment) => (
            StatusCode::CREATED,
            Json(AppointmentView::for_viewer(&appointment, &principal)),
        )
            .into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn list_mine<A>(
    State(usecase): State<Arc<AppointmentUseCase<A>>>,
    auth: AuthUser,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
{
    match usecase.list_for_student(&auth.principal()).await {
        Ok(appointments) => Json(appointments).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn list_for_counsellor<A>(
    State(usecase): State<Arc<AppointmentUseCase<A>>>,
    auth: AuthUser,
    Path(counsellor_id): Path<Uuid>,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
{
    match usecase
        .list_for_counsellor(&auth.principal(), counsellor_id)
        .await
    {
        Ok(appointments) => Json(appointments).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn get_appointment<A>(
    State(usecase): State<Arc<AppointmentUseCase<A>>>,
    auth: AuthUser,
    Path(appointment_id): Path<Uuid>,
) -> impl IntoResponse
where
    A: AppointmentRepository + Send + Sync + 'static,
{
    match usecase.get(&auth.principal(), appointment_id).await {
        Ok(appointment) => Json(appointment).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}
