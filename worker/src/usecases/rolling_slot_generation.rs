use anyhow::{Result, anyhow};
use backend::usecases::slot_generation::{MAX_WINDOW_DAYS, SlotGenerationUseCase, window_dates};
use booking_core::domain::{
    repositories::{counsellors::CounsellorRepository, time_slots::TimeSlotRepository},
    value_objects::clock::PlatformClock,
};
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

const MAX_REPORTED_IDS: usize = 20;

#[derive(Debug, Clone, Copy, Default)]
pub struct RollingSlotGenerationParams {
    /// Defaults to today in the platform timezone.
    pub start: Option<NaiveDate>,
    pub days: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RollingSlotGenerationResult {
    pub start: Option<NaiveDate>,
    pub days: u32,
    pub counsellors: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub created: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub exceptions_pruned: usize,
    pub expired_slots_purged: usize,
    pub failed_ids: Vec<Uuid>,
}

pub struct RollingSlotGenerationUseCase<C, T>
where
    C: CounsellorRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
{
    counsellor_repo: Arc<C>,
    slot_repo: Arc<T>,
    generator: SlotGenerationUseCase<C, T>,
    clock: PlatformClock,
    default_days: u32,
}

impl<C, T> RollingSlotGenerationUseCase<C, T>
where
    C: CounsellorRepository + Send + Sync + 'static,
    T: TimeSlotRepository + Send + Sync + 'static,
{
    pub fn new(
        counsellor_repo: Arc<C>,
        slot_repo: Arc<T>,
        clock: PlatformClock,
        default_days: u32,
    ) -> Self {
        Self {
            generator: SlotGenerationUseCase::new(
                Arc::clone(&counsellor_repo),
                Arc::clone(&slot_repo),
                clock,
            ),
            counsellor_repo,
            slot_repo,
            clock,
            default_days,
        }
    }

    /// Regenerates the next `days` dates for every schedulable counsellor, then purges
    /// unbooked slots past their retention. A failing counsellor is logged and counted;
    /// the run carries on with the rest.
    pub async fn run(
        &self,
        params: RollingSlotGenerationParams,
    ) -> Result<RollingSlotGenerationResult> {
        let today = self.clock.today();
        let start = params.start.unwrap_or(today).max(today);
        let days = params
            .days
            .filter(|d| *d > 0)
            .unwrap_or(self.default_days)
            .min(MAX_WINDOW_DAYS);
        if window_dates(start, days).is_none() {
            return Err(anyhow!("generation window of {days} days from {start} is out of range"));
        }

        let counsellor_ids = self.counsellor_repo.list_schedulable_ids().await?;

        let mut result = RollingSlotGenerationResult {
            start: Some(start),
            days,
            counsellors: counsellor_ids.len(),
            ..Default::default()
        };

        for counsellor_id in counsellor_ids {
            match self
                .counsellor_repo
                .prune_exceptions_before(counsellor_id, today)
                .await
            {
                Ok(pruned) => result.exceptions_pruned += pruned,
                Err(err) => {
                    warn!(
                        %counsellor_id,
                        db_error = ?err,
                        "rolling_generation: failed to prune past exceptions; continuing"
                    );
                }
            }

            match self.generator.generate_window(counsellor_id, start, days).await {
                Ok(reports) => {
                    result.succeeded += 1;
                    for report in reports {
                        result.created += report.created;
                        result.deleted += report.deleted;
                        result.unchanged += report.unchanged;
                        result.conflicts += report.conflicts.len();
                    }
                }
                Err(err) => {
                    error!(
                        %counsellor_id,
                        error = ?err,
                        "rolling_generation: counsellor failed; skipping"
                    );
                    result.failed += 1;
                    if result.failed_ids.len() < MAX_REPORTED_IDS {
                        result.failed_ids.push(counsellor_id);
                    }
                }
            }
        }

        match self.slot_repo.delete_expired_unbooked(Utc::now()).await {
            Ok(purged) => result.expired_slots_purged = purged,
            Err(err) => {
                warn!(
                    db_error = ?err,
                    "rolling_generation: failed to purge expired slots; continuing"
                );
            }
        }

        info!(
            %start,
            days,
            counsellors = result.counsellors,
            succeeded = result.succeeded,
            failed = result.failed,
            created = result.created,
            deleted = result.deleted,
            conflicts = result.conflicts,
            exceptions_pruned = result.exceptions_pruned,
            expired_slots_purged = result.expired_slots_purged,
            "rolling_generation: run finished"
        );

        Ok(result)
    }
}
