use std::sync::Arc;

use axum::http::StatusCode;
use booking_core::domain::{
    entities::time_slots::TimeSlotEntity,
    repositories::time_slots::TimeSlotRepository,
    value_objects::{
        clock::PlatformClock,
        enums::periods::Period,
        principal::Principal,
        time_slots::{GroupedSlots, SlotDeletion, SlotView},
    },
};
use chrono::NaiveDate;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Error)]
pub enum TimeSlotError {
    #[error("only the counsellor or an admin may do this")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for TimeSlotError {
    fn status_code(&self) -> StatusCode {
        match self {
            TimeSlotError::Forbidden => StatusCode::FORBIDDEN,
            TimeSlotError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            TimeSlotError::Forbidden => "forbidden",
            TimeSlotError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, TimeSlotError>;

pub struct TimeSlotUseCase<T>
where
    T: TimeSlotRepository + Send + Sync + 'static,
{
    slot_repo: Arc<T>,
    clock: PlatformClock,
}

impl<T> TimeSlotUseCase<T>
where
    T: TimeSlotRepository + Send + Sync + 'static,
{
    pub fn new(slot_repo: Arc<T>, clock: PlatformClock) -> Self {
        Self { slot_repo, clock }
    }

    async fn load(&self, counsellor_id: Uuid, date: NaiveDate) -> UseCaseResult<Vec<TimeSlotEntity>> {
        self.slot_repo
            .slots_for_date(counsellor_id, date)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "time_slots: failed to load slots");
                TimeSlotError::Internal(err)
            })
    }

    /// Unbooked slots that start after now, grouped by period.
    pub async fn available_slots(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<GroupedSlots> {
        let now_local = self.clock.now_local();
        let slots: Vec<TimeSlotEntity> = self
            .load(counsellor_id, date)
            .await?
            .into_iter()
            .filter(|slot| !slot.is_booked && slot.starts_at_local() > now_local)
            .collect();

        let grouped = GroupedSlots::from_slots(&slots);
        info!(%counsellor_id, %date, available = grouped.total(), "time_slots: available slots listed");
        Ok(grouped)
    }

    pub async fn booked_slots(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> UseCaseResult<Vec<SlotView>> {
        if !principal.can_manage_counsellor(counsellor_id) {
            return Err(TimeSlotError::Forbidden);
        }

        let mut booked: Vec<TimeSlotEntity> = self
            .load(counsellor_id, date)
            .await?
            .into_iter()
            .filter(|slot| slot.is_booked)
            .collect();
        booked.sort_by_key(|slot| slot.start_time);

        Ok(booked.iter().map(SlotView::from).collect())
    }

    /// Removes unbooked slots of a date, optionally for one period. Booked slots are counted,
    /// never deleted.
    pub async fn delete_slots(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
        date: NaiveDate,
        period: Option<Period>,
    ) -> UseCaseResult<SlotDeletion> {
        if !principal.can_manage_counsellor(counsellor_id) {
            return Err(TimeSlotError::Forbidden);
        }

        let deletion = self
            .slot_repo
            .delete_unbooked_for_date(counsellor_id, date, period)
            .await
            .map_err(|err| {
                error!(%counsellor_id, %date, db_error = ?err, "time_slots: failed to delete slots");
                TimeSlotError::Internal(err)
            })?;

        info!(
            %counsellor_id,
            %date,
            period = ?period,
            deleted = deletion.deleted,
            skipped_booked = deletion.skipped_booked,
            "time_slots: slots deleted"
        );
        Ok(deletion)
    }
}
