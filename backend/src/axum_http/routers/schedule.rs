use std::{collections::BTreeMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, put},
};
use booking_core::{
    domain::{
        repositories::counsellors::CounsellorRepository,
        value_objects::schedule::{DateException, PeriodFlags, TimeConfig},
    },
    infra::db::{
        postgres::postgres_connection::PgPoolSquad, repositories::counsellors::CounsellorPostgres,
    },
};
use tracing::info;
use uuid::Uuid;

use super::date_param;
use crate::{
    auth::AuthUser,
    axum_http::error_responses::AppError,
    usecases::{availability::AvailabilityResolver, schedule::ScheduleUseCase},
};

pub fn routes(db_pool: Arc<PgPoolSquad>) -> Router {
    let counsellor_repository = Arc::new(CounsellorPostgres::new(Arc::clone(&db_pool)));
    let schedule_usecase = ScheduleUseCase::new(Arc::clone(&counsellor_repository));
    let resolver = AvailabilityResolver::new(counsellor_repository);

    let schedule = Router::new()
        .route("/:counsellor_id/schedule", get(get_schedule))
        .route("/:counsellor_id/schedule/weekly", put(update_weekly))
        .route("/:counsellor_id/schedule/time-config", put(set_time_config))
        .route(
            "/:counsellor_id/schedule/exceptions/:date",
            put(upsert_exception).delete(delete_exception),
        )
        .with_state(Arc::new(schedule_usecase));

    let availability = Router::new()
        .route("/:counsellor_id/availability/:date", get(resolve_availability))
        .with_state(Arc::new(resolver));

    schedule.merge(availability)
}

pub async fn get_schedule<C>(
    State(usecase): State<Arc<ScheduleUseCase<C>>>,
    _auth: AuthUser,
    Path(counsellor_id): Path<Uuid>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    match usecase.get_schedule(counsellor_id).await {
        Ok(info) => Json(info).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn update_weekly<C>(
    State(usecase): State<Arc<ScheduleUseCase<C>>>,
    auth: AuthUser,
    Path(counsellor_id): Path<Uuid>,
    Json(days): Json<BTreeMap<String, PeriodFlags>>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    info!(user_id = %auth.user_id, %counsellor_id, "schedule: weekly update request received");
    match usecase.update_weekly(&auth.principal(), counsellor_id, days).await {
        Ok(weekly) => Json(weekly).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn set_time_config<C>(
    State(usecase): State<Arc<ScheduleUseCase<C>>>,
    auth: AuthUser,
    Path(counsellor_id): Path<Uuid>,
    Json(config): Json<TimeConfig>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    match usecase.set_time_config(&auth.principal(), counsellor_id, config).await {
        Ok(config) => Json(config).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn upsert_exception<C>(
    State(usecase): State<Arc<ScheduleUseCase<C>>>,
    auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
    Json(exception): Json<DateException>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    match usecase
        .upsert_exception(&auth.principal(), counsellor_id, date, exception)
        .await
    {
        Ok(exception) => Json(exception).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn delete_exception<C>(
    State(usecase): State<Arc<ScheduleUseCase<C>>>,
    auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    match usecase
        .delete_exception(&auth.principal(), counsellor_id, date)
        .await
    {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}

pub async fn resolve_availability<C>(
    State(resolver): State<Arc<AvailabilityResolver<C>>>,
    _auth: AuthUser,
    Path((counsellor_id, raw_date)): Path<(Uuid, String)>,
) -> impl IntoResponse
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    let date = match date_param(&raw_date) {
        Ok(date) => date,
        Err(err) => return err.into_response(),
    };
    match resolver.resolve(counsellor_id, date).await {
        Ok(resolved) => Json(resolved).into_response(),
        Err(err) => AppError::from_usecase(&err).into_response(),
    }
}
