use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::{
    domain::value_objects::{
        appointments::CounsellorSnapshot,
        schedule::{ScheduleExceptions, TimeConfig, WeeklyAvailability},
    },
    infra::db::postgres::schema::counsellors,
};

#[derive(Debug, Clone, Identifiable, Selectable, Queryable, Insertable)]
#[diesel(table_name = counsellors)]
pub struct CounsellorEntity {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub expertise: Option<String>,
    pub is_verified: bool,
    pub session_price_minor: Option<i64>,
    pub weekly_schedule: Option<serde_json::Value>, // WeeklyAvailability, absent until the counsellor saves one
    pub schedule_exceptions: serde_json::Value,     // ScheduleExceptions keyed by YYYY-MM-DD
    pub time_config: serde_json::Value,             // TimeConfig
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CounsellorEntity {
    pub fn weekly_availability(&self) -> Result<Option<WeeklyAvailability>> {
        self.weekly_schedule
            .clone()
            .filter(|value| !value.is_null())
            .map(serde_json::from_value)
            .transpose()
            .with_context(|| format!("counsellor {} has a malformed weekly schedule", self.id))
    }

    pub fn exceptions(&self) -> Result<ScheduleExceptions> {
        if self.schedule_exceptions.is_null() {
            return Ok(ScheduleExceptions::default());
        }
        serde_json::from_value(self.schedule_exceptions.clone())
            .with_context(|| format!("counsellor {} has malformed schedule exceptions", self.id))
    }

    pub fn time_settings(&self) -> Result<TimeConfig> {
        if self.time_config.is_null() {
            return Ok(TimeConfig::default());
        }
        serde_json::from_value(self.time_config.clone())
            .with_context(|| format!("counsellor {} has a malformed time config", self.id))
    }

    /// Price in minor units, only when it is set and positive.
    pub fn valid_session_price(&self) -> Option<i64> {
        self.session_price_minor.filter(|price| *price > 0)
    }

    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }

    pub fn snapshot(&self) -> CounsellorSnapshot {
        CounsellorSnapshot {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            expertise: self.expertise.clone(),
        }
    }
}
