use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::{
    entities::time_slots::{InsertTimeSlotEntity, TimeSlotEntity},
    value_objects::{enums::periods::Period, time_slots::SlotDeletion},
};

#[async_trait]
#[automock]
pub trait TimeSlotRepository {
    async fn slots_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlotEntity>>;

    async fn find_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlotEntity>>;

    /// Inserts new slots and rewrites existing unbooked ones. Booked rows are never touched.
    async fn upsert_unbooked_slots(&self, slots: Vec<InsertTimeSlotEntity>) -> Result<usize>;

    /// Deletes the listed slots that are still unbooked at write time.
    async fn delete_unbooked_slots(&self, slot_ids: Vec<String>) -> Result<SlotDeletion>;

    async fn delete_unbooked_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        period: Option<Period>,
    ) -> Result<SlotDeletion>;

    /// Removes unbooked slots whose `expires_at` is before `now`.
    async fn delete_expired_unbooked(&self, now: DateTime<Utc>) -> Result<usize>;
}
