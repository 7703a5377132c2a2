use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::payments::PaymentEntity;

#[async_trait]
#[automock]
pub trait PaymentRepository {
    async fn find_by_id(&self, payment_id: String) -> Result<Option<PaymentEntity>>;

    async fn list_for_student(&self, student_id: Uuid) -> Result<Vec<PaymentEntity>>;

    async fn list_for_counsellor(&self, counsellor_id: Uuid) -> Result<Vec<PaymentEntity>>;
}
