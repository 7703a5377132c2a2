use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
};
use booking_core::{
    domain::{
        repositories::{counsellors::CounsellorRepository, time_slots::TimeSlotRepository},
        value_objects::{clock::PlatformClock, enums::periods::Period},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad,
        repositories::{counsellors::CounsellorPostgres, time_slots::TimeSlotPostgres},
    },
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::date_param;
use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{slot_generation::SlotGenerationUseCase, time_slots::TimeSlotUseCase},
};

#[derive(Debug, Deserialize)]
pub struct DeleteSlotsQuery {
    period: Option<String>,
}

pub fn routes(db_pool: Arc<PgPoolSquad>, clock: PlatformClock) -> Router {
    let slot_repository = Arc::new(TimeSlotPostgres::new(Arc::clone(&db_pool)));
    let counsellor_repository = Arc::new(CounsellorPostgres::new(Arc::clone(&db_pool)));

    let slots_usecase = TimeSlotUseCase::new(Arc::clone(&slot_repository), clock);
    let generation_usecase =
        SlotGenerationUseCase::new(counsellor_repository, slot_repository, clock);

    let slots = Router::new()
        .route(
            "/:counsellor_id/slots/:date",
            get(available_slots).delete(delete_slots),
        )
        .route("/:counsellor_id/slots/:date/booked", get(booked_slots))
        .with_state(Arc::new(slots_usecase));

    let generation = Router::new()
        .route("/:counsellor_id/slots/:date/generate", post(generate_slots))
        .with_state(Arc::new(generation_usecase));

    slots.merge(generation)
}

pub async fn available_slots<T>(
    State(usecase): State<Arc<TimeSlotUseCase<T>>>,
    _auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
) -> impl IntoResponse
where
    T: TimeSlotRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    match usecase.available_slots(counsellor_id, date).await {
        Ok(grouped) => Json(grouped).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn booked_slots<T>(
    State(usecase): State<Arc<TimeSlotUseCase<T>>>,
    auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
) -> impl IntoResponse
where
    T: TimeSlotRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    match usecase
        .booked_slots(&auth.principal(), counsellor_id, date)
        .await
    {
        Ok(slots) => Json(slots).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn delete_slots<T>(
    State(usecase): State<Arc<TimeSlotUseCase<T>>>,
    auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
    Query(query): Query<DeleteSlotsQuery>,
) -> impl IntoResponse
where
    T: TimeSlotRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    let period = match query.period.as_deref() {
        None => None,
        Some(raw) => match Period::from_str(raw) {
            Some(period) => Some(period),
            None => {
                return AppError::BadRequest(format!(
                    "period must be morning, afternoon or evening, got {raw}"
                ))
                .into_response();
            }
        },
    };

    info!(user_id = %auth.user_id, %counsellor_id, %date, ?period, "time_slots: delete request received");
    match usecase
        .delete_slots(&auth.principal(), counsellor_id, date, period)
        .await
    {
        Ok(deletion) => Json(deletion).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn generate_slots<C, T>(
    State(usecase): State<Arc<SlotGenerationUseCase<C, T>>>,
    auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    info!(user_id = %auth.user_id, %counsellor_id, %date, "time_slots: on-demand generation requested");
    match usecase
        .generate_on_demand(&auth.principal(), counsellor_id, date)
        .await
    {
        Ok(report) => Json(report).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}
