use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::counsellors::CounsellorEntity,
    value_objects::schedule::{DateException, TimeConfig, WeeklyAvailability},
};

#[async_trait]
#[automock]
pub trait CounsellorRepository {
    async fn find_by_id(&self, counsellor_id: Uuid) -> Result<Option<CounsellorEntity>>;

    async fn update_weekly_availability(
        &self,
        counsellor_id: Uuid,
        weekly: WeeklyAvailability,
    ) -> Result<()>;

    async fn update_time_config(&self, counsellor_id: Uuid, config: TimeConfig) -> Result<()>;

    async fn upsert_exception(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        exception: DateException,
    ) -> Result<()>;

    /// Returns false when no exception existed for `date`.
    async fn delete_exception(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<bool>;

    async fn prune_exceptions_before(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<usize>;

    /// Verified counsellors that have saved a weekly schedule.
    async fn list_schedulable_ids(&self) -> Result<Vec<Uuid>>;
}
