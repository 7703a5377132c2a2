use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infra::db::postgres::schema::{counsellor_appointments, student_appointments};

#[derive(Debug, Clone, Selectable, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = counsellor_appointments)]
pub struct CounsellorAppointmentEntity {
    pub counsellor_id: Uuid,
    pub appointment_id: Uuid,
    pub document: serde_json::Value, // serialized AppointmentEntity
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Selectable, Queryable, Insertable, AsChangeset)]
#[diesel(table_name = student_appointments)]
pub struct StudentAppointmentEntity {
    pub student_id: Uuid,
    pub appointment_id: Uuid,
    pub document: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}
