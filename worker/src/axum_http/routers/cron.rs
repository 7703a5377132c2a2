use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use booking_core::infra::db::repositories::{
    counsellors::CounsellorPostgres, time_slots::TimeSlotPostgres,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{error, warn};

use crate::{
    config::config_model::DotEnvyConfig,
    usecases::{
        expire_pending_appointments::ExpirePendingAppointmentsUseCase,
        rolling_slot_generation::{RollingSlotGenerationParams, RollingSlotGenerationUseCase},
    },
};

// Run example
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/cron/generate-slots" \
//     -H "x-cron-secret: $CRON_SECRET" \
//     -H "Content-Type: application/json" \
//     -d '{"days":7}'
//   curl -X POST "http://localhost:$SERVER_PORT_WORKER/internal/v1/cron/expire-appointments" \
//     -H "x-cron-secret: $CRON_SECRET"

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

pub type RollingGeneration = RollingSlotGenerationUseCase<CounsellorPostgres, TimeSlotPostgres>;

#[derive(Clone)]
pub struct CronRouteState {
    config: Arc<DotEnvyConfig>,
    rolling: Arc<RollingGeneration>,
    expiry: Arc<ExpirePendingAppointmentsUseCase>,
}

pub fn routes(
    config: Arc<DotEnvyConfig>,
    rolling: Arc<RollingGeneration>,
    expiry: Arc<ExpirePendingAppointmentsUseCase>,
) -> Router {
    Router::new()
        .route("/generate-slots", post(generate_slots))
        .route("/expire-appointments", post(expire_appointments))
        .with_state(CronRouteState {
            config,
            rolling,
            expiry,
        })
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateSlotsRequest {
    pub start: Option<NaiveDate>,
    pub days: Option<u32>,
}

pub async fn generate_slots(
    State(state): State<CronRouteState>,
    headers: HeaderMap,
    payload: Option<Json<GenerateSlotsRequest>>,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    let payload = payload.map(|Json(body)| body).unwrap_or_default();
    let params = RollingSlotGenerationParams {
        start: payload.start,
        days: payload.days,
    };

    match state.rolling.run(params).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            error!(error = ?err, "cron: rolling generation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "slot generation failed").into_response()
        }
    }
}

pub async fn expire_appointments(
    State(state): State<CronRouteState>,
    headers: HeaderMap,
) -> Response {
    if let Err(response) = authorize(&state, &headers) {
        return response;
    }

    match state.expiry.run(Utc::now()).await {
        Ok(result) => Json(result).into_response(),
        Err(err) => {
            error!(error = ?err, "cron: expiry sweep failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "expiry sweep failed").into_response()
        }
    }
}

fn authorize(state: &CronRouteState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(expected) = state.config.cron.secret.as_deref() else {
        return Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "cron secret is not configured",
        )
            .into_response());
    };

    authorize_cron_secret(headers, expected).map_err(|status| {
        warn!("cron: rejected request with missing or wrong secret");
        (status, "Unauthorized cron request").into_response()
    })
}

fn authorize_cron_secret(headers: &HeaderMap, expected: &str) -> Result<(), StatusCode> {
    let provided = headers
        .get(CRON_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if provided == expected {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
