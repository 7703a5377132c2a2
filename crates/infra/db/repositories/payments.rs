use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{entities::payments::PaymentEntity, repositories::payments::PaymentRepository},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::payments},
};

pub struct PaymentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl PaymentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl PaymentRepository for PaymentPostgres {
    async fn find_by_id(&self, payment_id: String) -> Result<Option<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let payment = payments::table
                .find(payment_id)
                .select(PaymentEntity::as_select())
                .first::<PaymentEntity>(&mut conn)
                .optional()?;

            Ok(payment)
        })
        .await??)
    }

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let history = payments::table
                .filter(payments::student_id.eq(student_id))
                .select(PaymentEntity::as_select())
                .order(payments::created_at.desc())
                .load::<PaymentEntity>(&mut conn)?;

            Ok(history)
        })
        .await??)
    }

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<PaymentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Vec<PaymentEntity>> {
            let mut conn = db_pool.get()?;

            let history = payments::table
                .filter(payments::counsellor_id.eq(counsellor_id))
                .select(PaymentEntity::as_select())
                .order(payments::created_at.desc())
                .load::<PaymentEntity>(&mut conn)?;

            Ok(history)
        })
        .await??)
    }
}
