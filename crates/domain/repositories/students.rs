use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::students::StudentEntity;

#[async_trait]
#[automock]
pub trait StudentRepository {
    async fn find_by_id(&self, student_id: Uuid) -> Result<Option<StudentEntity>>;
}
