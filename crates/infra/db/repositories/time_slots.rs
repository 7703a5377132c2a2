use std::{collections::HashSet, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{
    Connection, RunQueryDsl, delete, dsl::count_star, insert_into, prelude::*,
    upsert::excluded,
};
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{
        entities::time_slots::{InsertTimeSlotEntity, TimeSlotEntity},
        repositories::time_slots::TimeSlotRepository,
        value_objects::{
            enums::periods::Period, slot_plan::SLOT_WRITE_CHUNK, time_slots::SlotDeletion,
        },
    },
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::time_slots},
};

pub struct TimeSlotPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl TimeSlotPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl TimeSlotRepository for TimeSlotPostgres {
    async fn slots_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<TimeSlotEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<TimeSlotEntity>> {
            let mut conn = db_pool.get()?;

            let slots = time_slots::table
                .filter(time_slots::counsellor_id.eq(counsellor_id))
                .filter(time_slots::date.eq(date))
                .select(TimeSlotEntity::as_select())
                .order(time_slots::start_time.asc())
                .load::<TimeSlotEntity>(&mut conn)?;

            Ok(slots)
        })
        .await??)
    }

    async fn find_slot(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
    ) -> Result<Option<TimeSlotEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<TimeSlotEntity>> {
            let mut conn = db_pool.get()?;

            let slot = time_slots::table
                .filter(time_slots::counsellor_id.eq(counsellor_id))
                .filter(time_slots::date.eq(date))
                .filter(time_slots::start_time.eq(start_time))
                .select(TimeSlotEntity::as_select())
                .first::<TimeSlotEntity>(&mut conn)
                .optional()?;

            Ok(slot)
        })
        .await??)
    }

    async fn upsert_unbooked_slots(&self, slots: Vec<InsertTimeSlotEntity>) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db_pool.get()?;
            let mut written = 0;

            for chunk in slots.chunks(SLOT_WRITE_CHUNK) {
                written += conn.transaction::<usize, anyhow::Error, _>(|tx| {
                    let ids: Vec<&str> = chunk.iter().map(|slot| slot.id.as_str()).collect();

                    let booked: HashSet<String> = time_slots::table
                        .filter(time_slots::id.eq_any(&ids))
                        .filter(time_slots::is_booked.eq(true))
                        .select(time_slots::id)
                        .for_update()
                        .load::<String>(tx)?
                        .into_iter()
                        .collect();

                    let writable: Vec<InsertTimeSlotEntity> = chunk
                        .iter()
                        .filter(|slot| !booked.contains(&slot.id))
                        .cloned()
                        .collect();
                    if writable.is_empty() {
                        return Ok(0);
                    }

                    let upsert = insert_into(time_slots::table)
                        .values(&writable)
                        .on_conflict(time_slots::id)
                        .do_update()
                        .set((
                            time_slots::period.eq(excluded(time_slots::period)),
                            time_slots::end_time.eq(excluded(time_slots::end_time)),
                            time_slots::expires_at.eq(excluded(time_slots::expires_at)),
                        ));
                    let count = diesel::query_dsl::methods::FilterDsl::filter(
                        upsert,
                        time_slots::is_booked.eq(false),
                    )
                    .execute(tx)?;

                    Ok(count)
                })?;
            }

            Ok(written)
        })
        .await??)
    }

    async fn delete_unbooked_slots(&self, slot_ids: Vec<String>) -> Result<SlotDeletion> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<SlotDeletion> {
            let mut conn = db_pool.get()?;
            let mut summary = SlotDeletion::default();

            for chunk in slot_ids.chunks(SLOT_WRITE_CHUNK) {
                let (deleted, skipped) = conn.transaction::<_, anyhow::Error, _>(|tx| {
                    let deleted = delete(
                        time_slots::table
                            .filter(time_slots::id.eq_any(chunk))
                            .filter(time_slots::is_booked.eq(false)),
                    )
                    .execute(tx)?;

                    let skipped = time_slots::table
                        .filter(time_slots::id.eq_any(chunk))
                        .filter(time_slots::is_booked.eq(true))
                        .select(count_star())
                        .first::<i64>(tx)?;

                    Ok((deleted, skipped as usize))
                })?;

                summary.deleted += deleted;
                summary.skipped_booked += skipped;
            }

            Ok(summary)
        })
        .await??)
    }

    async fn delete_unbooked_for_date(
        &self,
        counsellor_id: Uuid,
        date: NaiveDate,
        period: Option<Period>,
    ) -> Result<SlotDeletion> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<SlotDeletion> {
            let mut conn = db_pool.get()?;

            conn.transaction::<SlotDeletion, anyhow::Error, _>(|tx| {
                let booked = time_slots::table
                    .filter(time_slots::counsellor_id.eq(counsellor_id))
                    .filter(time_slots::date.eq(date))
                    .filter(time_slots::is_booked.eq(true));
                let skipped = match period {
                    Some(period) => booked
                        .filter(time_slots::period.eq(period.as_str()))
                        .select(count_star())
                        .first::<i64>(tx)?,
                    None => booked.select(count_star()).first::<i64>(tx)?,
                };

                let unbooked = time_slots::table
                    .filter(time_slots::counsellor_id.eq(counsellor_id))
                    .filter(time_slots::date.eq(date))
                    .filter(time_slots::is_booked.eq(false));
                let deleted = match period {
                    Some(period) => delete(unbooked.filter(time_slots::period.eq(period.as_str())))
                        .execute(tx)?,
                    None => delete(unbooked).execute(tx)?,
                };

                Ok(SlotDeletion {
                    deleted,
                    skipped_booked: skipped as usize,
                })
            })
        })
        .await??)
    }

    async fn delete_expired_unbooked(&self, now: DateTime<Utc>) -> Result<usize> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db_pool.get()?;

            let deleted = delete(
                time_slots::table
                    .filter(time_slots::is_booked.eq(false))
                    .filter(time_slots::expires_at.lt(now)),
            )
            .execute(&mut conn)?;

            Ok(deleted)
        })
        .await??)
    }
}
