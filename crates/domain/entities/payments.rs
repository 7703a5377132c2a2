use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infra::db::postgres::schema::payments;

/// One row per provider payment id; history view joining appointment, counsellor and student.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Identifiable, Selectable, Queryable, Insertable,
)]
#[diesel(table_name = payments)]
pub struct PaymentEntity {
    pub id: String,
    pub appointment_id: Uuid,
    pub order_id: String,
    pub counsellor_id: Uuid,
    pub student_id: Uuid,
    pub student_email: Option<String>,
    pub counsellor_name: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
    pub status: String,
    pub method: Option<String>,
    pub date: NaiveDate,
    pub time_slot: String,
    pub source: String, // verification | webhook, whichever arrived first
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
