use std::{collections::HashSet, sync::Arc};

use axum::http::StatusCode;
use booking_core::domain::{
    entities::time_slots::{InsertTimeSlotEntity, TimeSlotEntity},
    repositories::{counsellors::CounsellorRepository, time_slots::TimeSlotRepository},
    value_objects::{
        clock::PlatformClock,
        principal::Principal,
        schedule::ScheduleValidationError,
        slot_plan::{PlannedSlot, diff_against_existing, periods_without_window, plan_slots},
        time_slots::{SlotConflict, SlotGenerationReport},
    },
};
use chrono::{Duration, NaiveDate, Utc};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    ReasonedError,
    availability::{AvailabilityError, resolve_for},
};

#[derive(Debug, Error)]
pub enum SlotGenerationError {
    #[error("only the counsellor or an admin may generate slots")]
    Forbidden,
    #[error("counsellor not found")]
    CounsellorNotFound,
    #[error("counsellor has not set a weekly schedule")]
    NoWeeklySchedule,
    #[error("stored time config is invalid: {0}")]
    InvalidTimeConfig(ScheduleValidationError),
    #[error("cannot generate slots for past date {0}")]
    DateInPast(NaiveDate),
    #[error("window of {days} days starting {start} is out of range")]
    WindowOutOfRange { start: NaiveDate, days: u32 },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<AvailabilityError> for SlotGenerationError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::CounsellorNotFound => SlotGenerationError::CounsellorNotFound,
            AvailabilityError::NoWeeklySchedule => SlotGenerationError::NoWeeklySchedule,
            AvailabilityError::Internal(err) => SlotGenerationError::Internal(err),
        }
    }
}

impl ReasonedError for SlotGenerationError {
    fn status_code(&self) -> StatusCode {
        match self {
            SlotGenerationError::Forbidden => StatusCode::FORBIDDEN,
            SlotGenerationError::CounsellorNotFound => StatusCode::NOT_FOUND,
            SlotGenerationError::NoWeeklySchedule | SlotGenerationError::InvalidTimeConfig(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            SlotGenerationError::DateInPast(_) | SlotGenerationError::WindowOutOfRange { .. } => {
                StatusCode::BAD_REQUEST
            }
            SlotGenerationError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            SlotGenerationError::Forbidden => "forbidden",
            SlotGenerationError::CounsellorNotFound => "counsellor_not_found",
            SlotGenerationError::NoWeeklySchedule => "weekly_schedule_missing",
            SlotGenerationError::InvalidTimeConfig(_) => "invalid_time_config",
            SlotGenerationError::DateInPast(_) => "date_in_past",
            SlotGenerationError::WindowOutOfRange { .. } => "window_out_of_range",
            SlotGenerationError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, SlotGenerationError>;

/// Longest window a single generation call may cover.
pub const MAX_WINDOW_DAYS: u32 = 60;

/// Every date of the window, or `None` when it is too long or runs past the calendar.
pub fn window_dates(start: NaiveDate, days: u32) -> Option<Vec<NaiveDate>> {
    if days > MAX_WINDOW_DAYS {
        return None;
    }
    (0..days)
        .map(|offset| start.checked_add_signed(Duration::days(i64::from(offset))))
        .collect()
}

pub struct SlotGenerationUseCase<C, T>
where
    C: CounsellorRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
{
    counsellor_repo: Arc<C>,
    slot_repo: Arc<T>,
    clock: PlatformClock,
}

impl<C, T> SlotGenerationUseCase<C, T>
where
    C: CounsellorRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
{
    pub fn new(counsellor_repo: Arc<C>, slot_repo: Arc<T>, clock: PlatformClock) -> Self {
        Self {
            counsellor_repo,
            slot_repo,
            clock,
        }
    }

    pub fn clock(&self) -> PlatformClock {
        self.clock
    }

    /// Counsellor-triggered regeneration of one date.
    pub async fn generate_on_demand(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<SlotGenerationReport> {
        if !principal.can_manage_counsellor(counsellor_id) {
            return Err(SlotGenerationError::Forbidden);
        }
        if date < self.clock.today() {
            return Err(SlotGenerationError::DateInPast(date));
        }
        self.generate_for_date(counsellor_id, date).await
    }

    /// Regenerates `days` consecutive dates starting at `start`. Stops at the first failure.
    pub async fn generate_window(
        &self,
        counsellor_id: Uuid,
        start: NaiveDate,
        days: u32,
    ) -> UseCaseResult<Vec<SlotGenerationReport>> {
        let dates = window_dates(start, days)
            .ok_or(SlotGenerationError::WindowOutOfRange { start, days })?;

        let mut reports = Vec::with_capacity(dates.len());
        for date in dates {
            reports.push(self.generate_for_date(counsellor_id, date).await?);
        }
        Ok(reports)
    }

    /// Brings the stored slots of `date` in line with the counsellor's current availability.
    /// Re-running with unchanged inputs writes nothing.
    pub async fn generate_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<SlotGenerationReport> {
        let counsellor = self
            .counsellor_repo
            .find_by_id(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "slot_generation: failed to load counsellor");
                SlotGenerationError::Internal(err)
            })?
            .ok_or(SlotGenerationError::CounsellorNotFound)?;

        let resolved = resolve_for(&counsellor, date)?;
        let config = counsellor.time_settings()?;
        config
            .validate()
            .map_err(SlotGenerationError::InvalidTimeConfig)?;

        let active_periods = resolved.active_periods();
        let unconfigured = periods_without_window(&active_periods, &config);
        if !unconfigured.is_empty() {
            warn!(
                %counsellor_id,
                %date,
                periods = ?unconfigured,
                "slot_generation: active periods without a time window produce no slots"
            );
        }

        let planned = plan_slots(counsellor_id, date, &active_periods, &config);
        let existing = self.slots_for_date(counsellor_id, date).await?;
        let plan = diff_against_existing(planned, &existing, date, self.clock.now_local());

        let mut report = SlotGenerationReport {
            date: Some(date),
            unchanged: plan.unchanged,
            conflicts: plan.conflicts,
            active_periods,
            ..SlotGenerationReport::default()
        };

        if !plan.to_delete.is_empty() {
            let deletion = self
                .slot_repo
                .delete_unbooked_slots(plan.to_delete.clone())
                .await
                .map_err(|err| {
                    error!(%counsellor_id, %date, db_error = ?err, "slot_generation: failed to delete stale slots");
                    SlotGenerationError::Internal(err)
                })?;
            report.deleted = deletion.deleted;

            if deletion.skipped_booked > 0 {
                // Booked between the read and the delete.
                let stale: HashSet<&str> = plan.to_delete.iter().map(String::as_str).collect();
                let current = self.slots_for_date(counsellor_id, date).await?;
                report.conflicts.extend(
                    current
                        .iter()
                        .filter(|slot| slot.is_booked && stale.contains(slot.id.as_str()))
                        .map(SlotConflict::from_entity),
                );
            }
        }

        if !plan.to_create.is_empty() {
            let rows = self.insert_rows(counsellor_id, date, &plan.to_create);
            report.created = self
                .slot_repo
                .upsert_unbooked_slots(rows)
                .await
                .map_err(|err| {
                    error!(%counsellor_id, %date, db_error = ?err, "slot_generation: failed to write slots");
                    SlotGenerationError::Internal(err)
                })?;
        }

        for conflict in &report.conflicts {
            warn!(
                %counsellor_id,
                %date,
                slot_id = %conflict.slot_id,
                time_slot = %conflict.time_slot,
                "slot_generation: booked slot no longer matches availability"
            );
        }
        info!(
            %counsellor_id,
            %date,
            created = report.created,
            deleted = report.deleted,
            unchanged = report.unchanged,
            conflicts = report.conflicts.len(),
            "slot_generation: date regenerated"
        );

        Ok(report)
    }

    async fn slots_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<Vec<TimeSlotEntity>> {
        self.slot_repo
            .slots_for_date(counsellor_id, date)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "slot_generation: failed to load slots");
                SlotGenerationError::Internal(err)
            })
    }

    fn insert_rows(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        slots: &[PlannedSlot],
    ) -> Vec<InsertTimeSlotEntity> {
        let created_at = Utc::now();
        let expires_at = self.clock.end_of_day_utc(date);

        slots
            .iter()
            .map(|slot| InsertTimeSlotEntity {
                id: slot.id.clone(),
                counsellor_id,
                date,
                period: slot.period.to_string(),
                start_time: slot.start,
                end_time: slot.end,
                expires_at,
                created_at,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use booking_core::domain::{
        entities::counsellors::CounsellorEntity,
        repositories::{
            counsellors::MockCounsellorRepository, time_slots::MockTimeSlotRepository,
        },
        value_objects::{
            clock::parse_clock,
            enums::{periods::Period, roles::Role},
            slot_plan::slot_id,
            time_slots::SlotDeletion,
        },
    };
    use mockall::predicate::eq;
    use serde_json::json;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
    }

    fn counsellor(id: Uuid, exceptions: serde_json::Value) -> CounsellorEntity {
        let now = Utc::now();
        CounsellorEntity {
            id,
            email: "dev@example.com".to_string(),
            first_name: None,
            last_name: None,
            expertise: None,
            is_verified: true,
            session_price_minor: Some(50_000),
            weekly_schedule: Some(
                json!({"monday": {"morning": true, "afternoon": false, "evening": false}}),
            ),
            schedule_exceptions: exceptions,
            time_config: json!({
                "morning": {"start": "09:00", "end": "10:30"},
                "session_duration_minutes": 30
            }),
            created_at: now,
            updated_at: now,
        }
    }

    fn stored(counsellor_id: Uuid, start: &str, end: &str, booked: bool) -> TimeSlotEntity {
        let start = parse_clock(start).unwrap();
        TimeSlotEntity {
            id: slot_id(counsellor_id, monday(), Period::Morning, start),
            counsellor_id,
            date: monday(),
            period: "morning".to_string(),
            start_time: start,
            end_time: parse_clock(end).unwrap(),
            is_booked: booked,
            booked_by: booked.then(Uuid::new_v4),
            booked_at: None,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    fn counsellor_repo(counsellor_id: Uuid, exceptions: serde_json::Value) -> MockCounsellorRepository {
        let mut repo = MockCounsellorRepository::new();
        repo.expect_find_by_id()
            .with(eq(counsellor_id))
            .returning(move |id| {
                let counsellor = counsellor(id, exceptions.clone());
                Box::pin(async move { Ok(Some(counsellor)) })
            });
        repo
    }

    #[tokio::test]
    async fn first_run_creates_both_morning_sessions() {
        let counsellor_id = Uuid::new_v4();
        let mut slots = MockTimeSlotRepository::new();
        slots
            .expect_slots_for_date()
            .returning(|_, _| Box::pin(async { Ok(Vec::new()) }));
        slots.expect_delete_unbooked_slots().never();
        slots
            .expect_upsert_unbooked_slots()
            .withf(|rows| {
                rows.iter()
                    .map(|row| (row.start_time, row.end_time))
                    .eq([
                        (parse_clock("09:00").unwrap(), parse_clock("09:30").unwrap()),
                        (parse_clock("09:45").unwrap(), parse_clock("10:15").unwrap()),
                    ])
            })
            .times(1)
            .returning(|rows| {
                let count = rows.len();
                Box::pin(async move { Ok(count) })
            });

        let usecase = SlotGenerationUseCase::new(
            Arc::new(counsellor_repo(counsellor_id, json!({}))),
            Arc::new(slots),
            PlatformClock::utc(),
        );
        let report = usecase.generate_for_date(counsellor_id, monday()).await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.deleted, 0);
        assert!(report.conflicts.is_empty());
    }

    #[tokio::test]
    async fn unchanged_inputs_write_nothing() {
        let counsellor_id = Uuid::new_v4();
        let existing = vec![
            stored(counsellor_id, "09:00", "09:30", true),
            stored(counsellor_id, "09:45", "10:15", false),
        ];
        let mut slots = MockTimeSlotRepository::new();
        slots.expect_slots_for_date().returning(move |_, _| {
            let existing = existing.clone();
            Box::pin(async move { Ok(existing) })
        });
        slots.expect_upsert_unbooked_slots().never();
        slots.expect_delete_unbooked_slots().never();

        let usecase = SlotGenerationUseCase::new(
            Arc::new(counsellor_repo(counsellor_id, json!({}))),
            Arc::new(slots),
            PlatformClock::utc(),
        );
        let report = usecase.generate_for_date(counsellor_id, monday()).await.unwrap();

        assert_eq!(report.unchanged, 2);
        assert!(report.conflicts.is_empty());
    }

    #[tokio::test]
    async fn day_off_deletes_free_slots_and_reports_booked_ones() {
        let counsellor_id = Uuid::new_v4();
        let booked = stored(counsellor_id, "09:00", "09:30", true);
        let free = stored(counsellor_id, "09:45", "10:15", false);
        let free_id = free.id.clone();
        let existing = vec![booked.clone(), free];

        let mut slots = MockTimeSlotRepository::new();
        slots.expect_slots_for_date().returning(move |_, _| {
            let existing = existing.clone();
            Box::pin(async move { Ok(existing) })
        });
        slots
            .expect_delete_unbooked_slots()
            .with(eq(vec![free_id]))
            .times(1)
            .returning(|_| {
                Box::pin(async {
                    Ok(SlotDeletion {
                        deleted: 1,
                        skipped_booked: 0,
                    })
                })
            });
        slots.expect_upsert_unbooked_slots().never();

        let usecase = SlotGenerationUseCase::new(
            Arc::new(counsellor_repo(
                counsellor_id,
                json!({"2030-01-07": {"override_type": "off"}}),
            )),
            Arc::new(slots),
            PlatformClock::utc(),
        );
        let report = usecase.generate_for_date(counsellor_id, monday()).await.unwrap();

        assert_eq!(report.created, 0);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].slot_id, booked.id);
        assert!(report.active_periods.is_empty());
    }

    #[tokio::test]
    async fn on_demand_rejects_other_users_and_past_dates() {
        let counsellor_id = Uuid::new_v4();
        let usecase = SlotGenerationUseCase::new(
            Arc::new(MockCounsellorRepository::new()),
            Arc::new(MockTimeSlotRepository::new()),
            PlatformClock::utc(),
        );

        let stranger = Principal {
            id: Uuid::new_v4(),
            email: None,
            role: Role::Counsellor,
        };
        let result = usecase
            .generate_on_demand(&stranger, counsellor_id, monday())
            .await;
        assert!(matches!(result, Err(SlotGenerationError::Forbidden)));

        let owner = Principal {
            id: counsellor_id,
            email: None,
            role: Role::Counsellor,
        };
        let yesterday = PlatformClock::utc().today() - Duration::days(1);
        let result = usecase
            .generate_on_demand(&owner, counsellor_id, yesterday)
            .await;
        assert!(matches!(result, Err(SlotGenerationError::DateInPast(_))));
    }

    #[tokio::test]
    async fn window_past_the_calendar_or_too_long_is_rejected_before_any_lookup() {
        let usecase = SlotGenerationUseCase::new(
            Arc::new(MockCounsellorRepository::new()),
            Arc::new(MockTimeSlotRepository::new()),
            PlatformClock::utc(),
        );
        let counsellor_id = Uuid::new_v4();

        let near_end = NaiveDate::MAX - Duration::days(2);
        let result = usecase.generate_window(counsellor_id, near_end, 7).await;
        assert!(matches!(
            result,
            Err(SlotGenerationError::WindowOutOfRange { days: 7, .. })
        ));

        let result = usecase
            .generate_window(counsellor_id, monday(), u32::MAX)
            .await;
        assert!(matches!(
            result,
            Err(SlotGenerationError::WindowOutOfRange { .. })
        ));
    }

    #[test]
    fn window_dates_cover_consecutive_days() {
        let dates = window_dates(monday(), 3).unwrap();
        assert_eq!(
            dates,
            vec![monday(), monday() + Duration::days(1), monday() + Duration::days(2)]
        );
        assert_eq!(window_dates(monday(), MAX_WINDOW_DAYS).map(|d| d.len()), Some(60));
        assert!(window_dates(monday(), MAX_WINDOW_DAYS + 1).is_none());
    }
}
