use std::sync::Arc;

use axum::http::StatusCode;
use booking_core::domain::{
    entities::counsellors::CounsellorEntity,
    repositories::counsellors::CounsellorRepository,
    value_objects::{
        enums::periods::Period,
        schedule::{PeriodFlags, resolve_periods},
    },
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Error)]
pub enum AvailabilityError {
    #[error("counsellor not found")]
    CounsellorNotFound,
    #[error("counsellor has not set a weekly schedule")]
    NoWeeklySchedule,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for AvailabilityError {
    fn status_code(&self) -> StatusCode {
        match self {
            AvailabilityError::CounsellorNotFound => StatusCode::NOT_FOUND,
            AvailabilityError::NoWeeklySchedule => StatusCode::UNPROCESSABLE_ENTITY,
            AvailabilityError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            AvailabilityError::CounsellorNotFound => "counsellor_not_found",
            AvailabilityError::NoWeeklySchedule => "weekly_schedule_missing",
            AvailabilityError::Internal(_) => "internal_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAvailability {
    pub date: NaiveDate,
    #[serde(flatten)]
    pub periods: PeriodFlags,
    pub has_exception: bool,
}

impl ResolvedAvailability {
    pub fn active_periods(&self) -> Vec<Period> {
        self.periods.active_periods()
    }
}

/// Weekly template overlaid with the date exception, for a counsellor already in hand.
/// A missing weekly schedule is reported apart from a day with every period off.
pub fn resolve_for(
    counsellor: &CounsellorEntity,
    date: NaiveDate,
) -> Result<ResolvedAvailability, AvailabilityError> {
    let weekly = counsellor
        .weekly_availability()?
        .ok_or(AvailabilityError::NoWeeklySchedule)?;
    let exceptions = counsellor.exceptions()?;
    let exception = exceptions.get(date);

    Ok(ResolvedAvailability {
        date,
        periods: resolve_periods(&weekly, exception, date),
        has_exception: exception.is_some(),
    })
}

pub struct AvailabilityResolver<C>
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    counsellor_repo: Arc<C>,
}

impl<C> AvailabilityResolver<C>
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    pub fn new(counsellor_repo: Arc<C>) -> Self {
        Self { counsellor_repo }
    }

    pub async fn resolve(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> Result<ResolvedAvailability, AvailabilityError> {
        let counsellor = self
            .counsellor_repo
            .find_by_id(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "availability: failed to load counsellor");
                AvailabilityError::Internal(err)
            })?
            .ok_or(AvailabilityError::CounsellorNotFound)?;

        let resolved = resolve_for(&counsellor, date)?;
        info!(
            %counsellor_id,
            %date,
            morning = resolved.periods.morning,
            afternoon = resolved.periods.afternoon,
            evening = resolved.periods.evening,
            "availability: resolved"
        );
        Ok(resolved)
    }
}
