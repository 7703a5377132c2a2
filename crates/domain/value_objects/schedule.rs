use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{clock::format_clock, enums::periods::Period};

pub const DEFAULT_SESSION_DURATION_MINUTES: u32 = 30;

/// A session never spans more than one day.
pub const MAX_SESSION_DURATION_MINUTES: u32 = 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScheduleValidationError {
    #[error("weekly schedule must contain at least one day")]
    EmptyWeeklySchedule,
    #[error("unknown weekday `{0}`")]
    UnknownWeekday(String),
    #[error("{period} window must start before it ends ({start} - {end})")]
    InvalidWindow {
        period: Period,
        start: String,
        end: String,
    },
    #[error("session duration must be between 1 and 1440 minutes, got {0}")]
    InvalidSessionDuration(u32),
    #[error("{first} window overlaps {second} window")]
    OverlappingWindows { first: Period, second: Period },
    #[error("partial exception must override at least one period")]
    EmptyException,
}

/// On/off flag per period for one day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodFlags {
    pub morning: bool,
    pub afternoon: bool,
    pub evening: bool,
}

impl PeriodFlags {
    pub fn all_on() -> Self {
        Self {
            morning: true,
            afternoon: true,
            evening: true,
        }
    }

    pub fn is_on(&self, period: Period) -> bool {
        match period {
            Period::Morning => self.morning,
            Period::Afternoon => self.afternoon,
            Period::Evening => self.evening,
        }
    }

    pub fn active_periods(&self) -> Vec<Period> {
        Period::ALL
            .into_iter()
            .filter(|period| self.is_on(*period))
            .collect()
    }

    pub fn is_day_off(&self) -> bool {
        !(self.morning || self.afternoon || self.evening)
    }
}

/// Per-period overrides of a partial exception; `None` falls back to the weekly flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeriodOverrides {
    pub morning: Option<bool>,
    pub afternoon: Option<bool>,
    pub evening: Option<bool>,
}

impl PeriodOverrides {
    pub fn is_empty(&self) -> bool {
        self.morning.is_none() && self.afternoon.is_none() && self.evening.is_none()
    }

    fn over(&self, base: PeriodFlags) -> PeriodFlags {
        PeriodFlags {
            morning: self.morning.unwrap_or(base.morning),
            afternoon: self.afternoon.unwrap_or(base.afternoon),
            evening: self.evening.unwrap_or(base.evening),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "override_type", rename_all = "snake_case")]
pub enum DateException {
    Off,
    Partial { periods: PeriodOverrides },
}

impl DateException {
    pub fn validate(&self) -> Result<(), ScheduleValidationError> {
        match self {
            DateException::Partial { periods } if periods.is_empty() => {
                Err(ScheduleValidationError::EmptyException)
            }
            _ => Ok(()),
        }
    }
}

pub fn weekday_name(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Recurring availability keyed by lowercase weekday name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeeklyAvailability {
    days: BTreeMap<String, PeriodFlags>,
}

impl WeeklyAvailability {
    /// Accepts `Monday`, `monday` or `mon`; keys are stored as `monday`.
    pub fn from_days(
        days: BTreeMap<String, PeriodFlags>,
    ) -> Result<Self, ScheduleValidationError> {
        if days.is_empty() {
            return Err(ScheduleValidationError::EmptyWeeklySchedule);
        }

        let mut normalized = BTreeMap::new();
        for (raw_day, flags) in days {
            let weekday = raw_day
                .trim()
                .parse::<Weekday>()
                .map_err(|_| ScheduleValidationError::UnknownWeekday(raw_day.clone()))?;
            normalized.insert(weekday_name(weekday).to_string(), flags);
        }

        Ok(Self { days: normalized })
    }

    /// Days missing from the template are fully off.
    pub fn for_weekday(&self, weekday: Weekday) -> PeriodFlags {
        self.days
            .get(weekday_name(weekday))
            .copied()
            .unwrap_or_default()
    }

    pub fn days(&self) -> &BTreeMap<String, PeriodFlags> {
        &self.days
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleExceptions {
    by_date: BTreeMap<NaiveDate, DateException>,
}

impl ScheduleExceptions {
    pub fn get(&self, date: NaiveDate) -> Option<&DateException> {
        self.by_date.get(&date)
    }

    pub fn insert(&mut self, date: NaiveDate, exception: DateException) {
        self.by_date.insert(date, exception);
    }

    pub fn remove(&mut self, date: NaiveDate) -> bool {
        self.by_date.remove(&date).is_some()
    }

    /// Drops exceptions dated strictly before `date`, returning how many were removed.
    pub fn prune_before(&mut self, date: NaiveDate) -> usize {
        let before = self.by_date.len();
        self.by_date = self.by_date.split_off(&date);
        before - self.by_date.len()
    }

    pub fn len(&self) -> usize {
        self.by_date.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NaiveDate, &DateException)> {
        self.by_date.iter()
    }
}

/// Merges the weekly template with an optional exception for `date`.
pub fn resolve_periods(
    weekly: &WeeklyAvailability,
    exception: Option<&DateException>,
    date: NaiveDate,
) -> PeriodFlags {
    let base = weekly.for_weekday(date.weekday());

    match exception {
        None => base,
        Some(DateException::Off) => PeriodFlags::default(),
        Some(DateException::Partial { periods }) => periods.over(base),
    }
}

mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use crate::domain::value_objects::clock::{format_clock, parse_clock};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_clock(*time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_clock(&raw).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodWindow {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeConfig {
    #[serde(default)]
    pub morning: Option<PeriodWindow>,
    #[serde(default)]
    pub afternoon: Option<PeriodWindow>,
    #[serde(default)]
    pub evening: Option<PeriodWindow>,
    #[serde(default = "default_session_duration")]
    pub session_duration_minutes: u32,
}

fn default_session_duration() -> u32 {
    DEFAULT_SESSION_DURATION_MINUTES
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            morning: None,
            afternoon: None,
            evening: None,
            session_duration_minutes: DEFAULT_SESSION_DURATION_MINUTES,
        }
    }
}

impl TimeConfig {
    pub fn window(&self, period: Period) -> Option<PeriodWindow> {
        match period {
            Period::Morning => self.morning,
            Period::Afternoon => self.afternoon,
            Period::Evening => self.evening,
        }
    }

    pub fn validate(&self) -> Result<(), ScheduleValidationError> {
        if self.session_duration_minutes == 0
            || self.session_duration_minutes > MAX_SESSION_DURATION_MINUTES
        {
            return Err(ScheduleValidationError::InvalidSessionDuration(
                self.session_duration_minutes,
            ));
        }

        let mut windows = Vec::with_capacity(Period::ALL.len());
        for period in Period::ALL {
            if let Some(window) = self.window(period) {
                if window.start >= window.end {
                    return Err(ScheduleValidationError::InvalidWindow {
                        period,
                        start: format_clock(window.start),
                        end: format_clock(window.end),
                    });
                }
                windows.push((period, window));
            }
        }

        for (index, (first, a)) in windows.iter().enumerate() {
            for (second, b) in &windows[index + 1..] {
                if a.start < b.end && b.start < a.end {
                    return Err(ScheduleValidationError::OverlappingWindows {
                        first: *first,
                        second: *second,
                    });
                }
            }
        }

        Ok(())
    }
}
