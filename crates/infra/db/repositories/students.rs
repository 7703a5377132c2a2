use anyhow::Result;
use async_trait::async_trait;
use diesel::{RunQueryDsl, prelude::*};
use std::sync::Arc;
use tokio::task;
use uuid::Uuid;

use crate::{
    domain::{entities::students::StudentEntity, repositories::students::StudentRepository},
    infra::db::postgres::{postgres_connection::PgPoolSquad, schema::students},
};

pub struct StudentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl StudentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl StudentRepository for StudentPostgres {
    async fn find_by_id(&self, student_id: Uuid) -> Result<Option<StudentEntity>> {
        let db_pool = Arc::clone(&self.db_pool);

        Ok(task::spawn_blocking(move || -> Result<Option<StudentEntity>> {
            let mut conn = db_pool.get()?;

            let student = students::table
                .find(student_id)
                .select(StudentEntity::as_select())
                .first::<StudentEntity>(&mut conn)
                .optional()?;

            Ok(student)
        })
        .await??)
    }
}
