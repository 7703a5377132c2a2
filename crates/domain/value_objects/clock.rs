use anyhow::{Context, Result, anyhow};
use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const CLOCK_FORMAT: &str = "%H:%M";

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT)
        .with_context(|| format!("invalid date `{}`, expected YYYY-MM-DD", raw.trim()))
}

pub fn parse_clock(raw: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), CLOCK_FORMAT)
        .with_context(|| format!("invalid time `{}`, expected HH:MM", raw.trim()))
}

pub fn format_clock(time: NaiveTime) -> String {
    time.format(CLOCK_FORMAT).to_string()
}

/// Wall clock of the platform. Dates and slot times are local to one fixed offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformClock {
    offset: FixedOffset,
}

impl PlatformClock {
    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    pub fn from_offset_minutes(minutes: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(minutes * 60)
            .ok_or_else(|| anyhow!("utc offset of {minutes} minutes is out of range"))?;
        Ok(Self { offset })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now_local(&self) -> NaiveDateTime {
        self.local_from_utc(Utc::now())
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date()
    }

    pub fn local_from_utc(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset).naive_local()
    }

    pub fn to_utc(&self, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
        let local = date.and_time(time);
        let utc = local - Duration::seconds(i64::from(self.offset.local_minus_utc()));
        Utc.from_utc_datetime(&utc)
    }

    /// Last second of `date` in platform time, used as slot retention deadline.
    pub fn end_of_day_utc(&self, date: NaiveDate) -> DateTime<Utc> {
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.to_utc(date, last_second)
    }
}

impl Default for PlatformClock {
    fn default() -> Self {
        Self::utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_local_wall_time_to_utc() {
        let clock = PlatformClock::from_offset_minutes(330).unwrap();
        let date = parse_date("2030-01-07").unwrap();
        let time = parse_clock("09:00").unwrap();

        let utc = clock.to_utc(date, time);
        assert_eq!(utc.to_rfc3339(), "2030-01-07T03:30:00+00:00");
        assert_eq!(clock.local_from_utc(utc), date.and_time(time));
    }

    #[test]
    fn rejects_malformed_dates_and_times() {
        assert!(parse_date("2030-13-01").is_err());
        assert!(parse_date("07/01/2030").is_err());
        assert!(parse_clock("9am").is_err());
        assert!(parse_clock("25:00").is_err());
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        assert!(PlatformClock::from_offset_minutes(24 * 60).is_err());
    }
}
