use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use diesel::{Connection, RunQueryDsl, prelude::*, update};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::counsellors::CounsellorEntity,
        repositories::counsellors::CounsellorRepository,
        value_objects::schedule::{
            DateException, ScheduleExceptions, TimeConfig, WeeklyAvailability,
        },
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::counsellors},
};

pub struct CounsellorPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CounsellorPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }

    /// Read-modify-write of the exceptions map under a row lock.
    async fn modify_exceptions<T, F>(&self, counsellor_id: Uuid, change: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut ScheduleExceptions) -> T + Send + 'static,
    {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<T> {
            let mut conn = db_pool.get()?;

            conn.transaction::<T, anyhow::Error, _>(|tx| {
                let raw = counsellors::table
                    .find(counsellor_id)
                    .select(counsellors::schedule_exceptions)
                    .for_update()
                    .first::<serde_json::Value>(tx)
                    .optional()?
                    .ok_or_else(|| anyhow!("counsellor {counsellor_id} not found"))?;

                let mut exceptions: ScheduleExceptions = if raw.is_null() {
                    ScheduleExceptions::default()
                } else {
                    serde_json::from_value(raw).context("malformed schedule exceptions")?
                };

                let outcome = change(&mut exceptions);

                update(counsellors::table.find(counsellor_id))
                    .set((
                        counsellors::schedule_exceptions.eq(serde_json::to_value(&exceptions)?),
                        counsellors::updated_at.eq(Utc::now()),
                    ))
                    .execute(tx)?;

                Ok(outcome)
            })
        })
        .await??)
    }
}

#[async_trait]
impl CounsellorRepository for CounsellorPostgres {
    async fn find_by_id(&self, counsellor_id: Uuid) -> Result<Option<CounsellorEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<CounsellorEntity>> {
            let mut conn = db_pool.get()?;

            let counsellor = counsellors::table
                .find(counsellor_id)
                .select(CounsellorEntity::as_select())
                .first::<CounsellorEntity>(&mut conn)
                .optional()?;

            Ok(counsellor)
        })
        .await??)
    }

    async fn update_weekly_availability(
        &self,
        counsellor_id: Uuid,
        weekly: WeeklyAvailability,
    ) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);
        let weekly = serde_json::to_value(&weekly)?;

        Ok(task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            update(counsellors::table.find(counsellor_id))
                .set((
                    counsellors::weekly_schedule.eq(Some(weekly)),
                    counsellors::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?;

            Ok(())
        })
        .await??)
    }

    async fn update_time_config(&self, counsellor_id: Uuid, config: TimeConfig) -> Result<()> {
        let db_pool = Arc::clone(&self.db_pool);
        let config = serde_json::to_value(config)?;

        Ok(task::spawn_blocking(move || -> Result<()> {
            let mut conn = db_pool.get()?;

            update(counsellors::table.find(counsellor_id))
                .set((
                    counsellors::time_config.eq(config),
                    counsellors::updated_at.eq(Utc::now()),
                ))
                .execute(&mut conn)?;

            Ok(())
        })
        .await??)
    }

    async fn upsert_exception(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        exception: DateException,
    ) -> Result<()> {
        self.modify_exceptions(counsellor_id, move |exceptions| {
            exceptions.insert(date, exception)
        })
        .await
    }

    async fn delete_exception(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<bool> {
        self.modify_exceptions(counsellor_id, move |exceptions| exceptions.remove(date))
            .await
    }

    async fn prune_exceptions_before(&self, counsellor_id: Uuid, date: NaiveDate) -> Result<usize> {
        self.modify_exceptions(counsellor_id, move |exceptions| {
            exceptions.prune_before(date)
        })
        .await
    }

    async fn list_schedulable_ids(&self) -> Result<Vec<Uuid>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<Uuid>> {
            let mut conn = db_pool.get()?;

            let ids = counsellors::table
                .filter(counsellors::is_verified.eq(true))
                .filter(counsellors::weekly_schedule.is_not_null())
                .select(counsellors::id)
                .order(counsellors::created_at.asc())
                .load::<Uuid>(&mut conn)?;

            Ok(ids)
        })
        .await??)
    }
}
