use std::{collections::BTreeMap, sync::Arc};

use axum::http::StatusCode;
use booking_core::domain::{
    entities::counsellors::CounsellorEntity,
    repositories::counsellors::CounsellorRepository,
    value_objects::{
        principal::Principal,
        schedule::{
            DateException, PeriodFlags, ScheduleExceptions, ScheduleValidationError, TimeConfig,
            WeeklyAvailability,
        },
    },
};
use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("only the counsellor or an admin may change this schedule")]
    Forbidden,
    #[error("counsellor not found")]
    CounsellorNotFound,
    #[error(transparent)]
    Invalid(#[from] ScheduleValidationError),
    #[error("no exception exists for {0}")]
    ExceptionNotFound(NaiveDate),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for ScheduleError {
    fn status_code(&self) -> StatusCode {
        match self {
            ScheduleError::Forbidden => StatusCode::FORBIDDEN,
            ScheduleError::CounsellorNotFound | ScheduleError::ExceptionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ScheduleError::Invalid(_) => StatusCode::BAD_REQUEST,
            ScheduleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            ScheduleError::Forbidden => "forbidden",
            ScheduleError::CounsellorNotFound => "counsellor_not_found",
            ScheduleError::Invalid(ScheduleValidationError::UnknownWeekday(_)) => "unknown_weekday",
            ScheduleError::Invalid(ScheduleValidationError::EmptyWeeklySchedule) => {
                "empty_weekly_schedule"
            }
            ScheduleError::Invalid(ScheduleValidationError::InvalidWindow { .. }) => {
                "invalid_period_window"
            }
            ScheduleError::Invalid(ScheduleValidationError::InvalidSessionDuration(_)) => {
                "invalid_session_duration"
            }
            ScheduleError::Invalid(ScheduleValidationError::OverlappingWindows { .. }) => {
                "overlapping_period_windows"
            }
            ScheduleError::Invalid(ScheduleValidationError::EmptyException) => "empty_exception",
            ScheduleError::ExceptionNotFound(_) => "exception_not_found",
            ScheduleError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, ScheduleError>;

#[derive(Debug, Clone, Serialize)]
pub struct ScheduleInfo {
    pub counsellor_id: Uuid,
    pub weekly: Option<WeeklyAvailability>,
    pub time_config: TimeConfig,
    pub exceptions: ScheduleExceptions,
}

pub struct ScheduleUseCase<C>
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    counsellor_repo: Arc<C>,
}

impl<C> ScheduleUseCase<C>
where
    C: CounsellorRepository + Send + Sync + 'static,
{
    pub fn new(counsellor_repo: Arc<C>) -> Self {
        Self { counsellor_repo }
    }

    async fn load(&self, counsellor_id: Uuid) -> UseCaseResult<CounsellorEntity> {
        self.counsellor_repo
            .find_by_id(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "schedule: failed to load counsellor");
                ScheduleError::Internal(err)
            })?
            .ok_or(ScheduleError::CounsellorNotFound)
    }

    async fn authorize(&self, principal: &Principal, counsellor_id: Uuid) -> UseCaseResult<()> {
        if !principal.can_manage_counsellor(counsellor_id) {
            warn!(
                user_id = %principal.id,
                %counsellor_id,
                "schedule: mutation rejected for non-owner"
            );
            return Err(ScheduleError::Forbidden);
        }
        self.load(counsellor_id).await.map(|_| ())
    }

    pub async fn get_schedule(&self, counsellor_id: Uuid) -> UseCaseResult<ScheduleInfo> {
        let counsellor = self.load(counsellor_id).await?;

        Ok(ScheduleInfo {
            counsellor_id,
            weekly: counsellor.weekly_availability()?,
            time_config: counsellor.time_settings()?,
            exceptions: counsellor.exceptions()?,
        })
    }

    /// Replaces the weekly template. Day keys are matched case-insensitively.
    pub async fn update_weekly(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        days: BTreeMap<String, PeriodFlags>,
    ) -> UseCaseResult<WeeklyAvailability> {
        let weekly = WeeklyAvailability::from_days(days)?;
        self.authorize(principal, counsellor_id).await?;

        self.counsellor_repo
            .update_weekly_availability(counsellor_id, weekly.clone())
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "schedule: failed to save weekly schedule");
                ScheduleError::Internal(err)
            })?;

        info!(%counsellor_id, days = weekly.days().len(), "schedule: weekly schedule saved");
        Ok(weekly)
    }

    pub async fn set_time_config(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        config: TimeConfig,
    ) -> UseCaseResult<TimeConfig> {
        config.validate()?;
        self.authorize(principal, counsellor_id).await?;

        self.counsellor_repo
            .update_time_config(counsellor_id, config)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "schedule: failed to save time config");
                ScheduleError::Internal(err)
            })?;

        info!(
            %counsellor_id,
            session_duration_minutes = config.session_duration_minutes,
            "schedule: time config saved"
        );
        Ok(config)
    }

    pub async fn upsert_exception(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        date: NaiveDate,
        exception: DateException,
    ) -> UseCaseResult<DateException> {
        exception.validate()?;
        self.authorize(principal, counsellor_id).await?;

        self.counsellor_repo
            .upsert_exception(counsellor_id, date, exception)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "schedule: failed to save exception");
                ScheduleError::Internal(err)
            })?;

        info!(%counsellor_id, %date, ?exception, "schedule: exception saved");
        Ok(exception)
    }

    pub async fn delete_exception(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<()> {
        self.authorize(principal, counsellor_id).await?;

        let removed = self
            .counsellor_repo
            .delete_exception(counsellor_id, date)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "schedule: failed to delete exception");
                ScheduleError::Internal(err)
            })?;

        if !removed {
            return Err(ScheduleError::ExceptionNotFound(date));
        }
        info!(%counsellor_id, %date, "schedule: exception removed");
        Ok(())
    }
}
