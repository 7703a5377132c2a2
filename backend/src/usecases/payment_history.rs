use std::sync::Arc;

use axum::http::StatusCode;
use booking_core::domain::{
    entities::payments::PaymentEntity, repositories::payments::PaymentRepository,
    value_objects::principal::Principal,
};
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use super::ReasonedError;

#[derive(Debug, Error)]
pub enum PaymentHistoryError {
    #[error("not allowed to view this payment history")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ReasonedError for PaymentHistoryError {
    fn status_code(&self) -> StatusCode {
        match self {
            PaymentHistoryError::Forbidden => StatusCode::FORBIDDEN,
            PaymentHistoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            PaymentHistoryError::Forbidden => "forbidden",
            PaymentHistoryError::Internal(_) => "internal_error",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentHistoryError>;

pub struct PaymentHistoryUseCase<P>
where
    P: PaymentRepository + Send + Sync + 'static,
{
    payment_repo: Arc<P>,
}

impl<P> PaymentHistoryUseCase<P>
where
    P: PaymentRepository + Send + Sync + 'static,
{
    pub fn new(payment_repo: Arc<P>) -> Self {
        Self { payment_repo }
    }

    /// Newest first.
    pub async fn for_student(
        &self,
        principal: &Principal,
        student_id: Uuid,
    ) -> UseCaseResult<Vec<PaymentEntity>> {
        if !principal.is_admin() && principal.id != student_id {
            return Err(PaymentHistoryError::Forbidden);
        }
        let mut payments = self
            .payment_repo
            .list_for_student(student_id)
            .await
            .map_err(|err| {
                error!(%student_id, db_error = ?err, "payment_history: failed to list student payments");
                PaymentHistoryError::Internal(err)
            })?;
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }

    pub async fn for_counsellor(
        &self,
        principal: &Principal,
        counsellor_id: Uuid,
    ) -> UseCaseResult<Vec<PaymentEntity>> {
        if !principal.can_manage_counsellor(counsellor_id) {
            return Err(PaymentHistoryError::Forbidden);
        }
        let mut payments = self
            .payment_repo
            .list_for_counsellor(counsellor_id)
            .await
            .map_err(|err| {
                error!(%counsellor_id, db_error = ?err, "payment_history: failed to list counsellor payments");
                PaymentHistoryError::Internal(err)
            })?;
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}
