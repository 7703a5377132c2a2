use anyhow::{Result, bail};
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    clock::{format_clock, parse_clock},
    enums::periods::Period,
};
use crate::domain::entities::time_slots::TimeSlotEntity;

/// A `HH:MM-HH:MM` range as presented by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlotRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlotRange {
    pub fn parse(raw: &str) -> Result<Self> {
        let Some((start, end)) = raw.split_once('-') else {
            bail!("invalid time slot `{raw}`, expected HH:MM-HH:MM");
        };
        let start = parse_clock(start)?;
        let end = parse_clock(end)?;
        if start >= end {
            bail!("time slot `{raw}` must start before it ends");
        }
        Ok(Self { start, end })
    }

    pub fn label(&self) -> String {
        format!("{}-{}", format_clock(self.start), format_clock(self.end))
    }
}

/// Client-facing view of a stored slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotView {
    pub id: String,
    pub date: NaiveDate,
    pub period: String,
    pub start_time: String,
    pub end_time: String,
    pub time_slot: String,
    pub is_booked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_by: Option<Uuid>,
}

impl From<&TimeSlotEntity> for SlotView {
    fn from(slot: &TimeSlotEntity) -> Self {
        Self {
            id: slot.id.clone(),
            date: slot.date,
            period: slot.period.clone(),
            start_time: format_clock(slot.start_time),
            end_time: format_clock(slot.end_time),
            time_slot: slot.range().label(),
            is_booked: slot.is_booked,
            booked_by: slot.booked_by,
        }
    }
}

/// Slots bucketed by their stored period; unknown period labels land in `other`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupedSlots {
    pub morning: Vec<SlotView>,
    pub afternoon: Vec<SlotView>,
    pub evening: Vec<SlotView>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<SlotView>,
}

impl GroupedSlots {
    pub fn from_slots(slots: &[TimeSlotEntity]) -> Self {
        let mut sorted: Vec<&TimeSlotEntity> = slots.iter().collect();
        sorted.sort_by_key(|slot| slot.start_time);

        let mut grouped = Self::default();
        for slot in sorted {
            let view = SlotView::from(slot);
            match Period::from_str(&slot.period) {
                Some(Period::Morning) => grouped.morning.push(view),
                Some(Period::Afternoon) => grouped.afternoon.push(view),
                Some(Period::Evening) => grouped.evening.push(view),
                None => grouped.other.push(view),
            }
        }
        grouped
    }

    pub fn total(&self) -> usize {
        self.morning.len() + self.afternoon.len() + self.evening.len() + self.other.len()
    }
}

/// A booked slot that current availability no longer implies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotConflict {
    pub slot_id: String,
    pub period: String,
    pub time_slot: String,
    pub booked_by: Option<Uuid>,
}

impl SlotConflict {
    pub fn from_entity(slot: &TimeSlotEntity) -> Self {
        Self {
            slot_id: slot.id.clone(),
            period: slot.period.clone(),
            time_slot: slot.range().label(),
            booked_by: slot.booked_by,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotGenerationReport {
    pub date: Option<NaiveDate>,
    pub created: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub conflicts: Vec<SlotConflict>,
    pub active_periods: Vec<Period>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotDeletion {
    pub deleted: usize,
    pub skipped_booked: usize,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::value_objects::clock::parse_date;

    fn slot(period: &str, start: &str, end: &str) -> TimeSlotEntity {
        TimeSlotEntity {
            id: format!("c_2030-01-07_{period}_{start}"),
            counsellor_id: Uuid::nil(),
            date: parse_date("2030-01-07").unwrap(),
            period: period.to_string(),
            start_time: parse_clock(start).unwrap(),
            end_time: parse_clock(end).unwrap(),
            is_booked: false,
            booked_by: None,
            booked_at: None,
            expires_at: Utc::now(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn parses_and_labels_ranges() {
        let range = TimeSlotRange::parse(" 09:00 - 09:30 ").unwrap();
        assert_eq!(range.label(), "09:00-09:30");
    }

    #[test]
    fn rejects_ranges_without_separator_or_inverted() {
        assert!(TimeSlotRange::parse("09:00").is_err());
        assert!(TimeSlotRange::parse("09:30-09:00").is_err());
        assert!(TimeSlotRange::parse("9am-10am").is_err());
    }

    #[test]
    fn groups_by_stored_period_in_start_order() {
        let slots = vec![
            slot("evening", "18:00", "18:30"),
            slot("morning", "09:45", "10:15"),
            slot("morning", "09:00", "09:30"),
            slot("night", "23:00", "23:30"),
        ];

        let grouped = GroupedSlots::from_slots(&slots);

        let morning: Vec<&str> = grouped
            .morning
            .iter()
            .map(|view| view.time_slot.as_str())
            .collect();
        assert_eq!(morning, vec!["09:00-09:30", "09:45-10:15"]);
        assert!(grouped.afternoon.is_empty());
        assert_eq!(grouped.evening.len(), 1);
        assert_eq!(grouped.other.len(), 1);
        assert_eq!(grouped.total(), 4);
    }
}
