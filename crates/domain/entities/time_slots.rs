use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::time_slots::TimeSlotRange, infra::db::postgres::schema::time_slots,
};

#[derive(Debug, Clone, PartialEq, Eq, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = time_slots)]
pub struct TimeSlotEntity {
    pub id: String, // {counsellor_id}_{date}_{period}_{HH:MM}
    pub counsellor_id: Uuid,
    pub date: NaiveDate,
    pub period: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_booked: bool,
    pub booked_by: Option<Uuid>,
    pub booked_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl TimeSlotEntity {
    pub fn range(&self) -> TimeSlotRange {
        TimeSlotRange {
            start: self.start_time,
            end: self.end_time,
        }
    }

    pub fn starts_at_local(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }
}

/// Row written by slot generation; booking columns are left to their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Insertable)]
#[diesel(table_name = time_slots)]
pub struct InsertTimeSlotEntity {
    pub id: String,
    pub counsellor_id: Uuid,
    pub date: NaiveDate,
    pub period: String,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl InsertTimeSlotEntity {
    pub fn into_unbooked(self) -> TimeSlotEntity {
        TimeSlotEntity {
            id: self.id,
            counsellor_id: self.counsellor_id,
            date: self.date,
            period: self.period,
            start_time: self.start_time,
            end_time: self.end_time,
            is_booked: false,
            booked_by: None,
            booked_at: None,
            expires_at: self.expires_at,
            created_at: self.created_at,
        }
    }
}
