use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use uuid::Uuid;

use super::{
    clock::{CLOCK_FORMAT, format_clock},
    enums::periods::Period,
    schedule::{PeriodWindow, TimeConfig},
    time_slots::SlotConflict,
};
use crate::domain::entities::time_slots::TimeSlotEntity;

/// Mandatory gap between the end of one session and the start of the next.
pub const SESSION_BREAK_MINUTES: u32 = 15;

/// Upper bound of slot rows written per store transaction.
pub const SLOT_WRITE_CHUNK: usize = 400;

/// `{counsellor}_{date}_{period}_{HH:MM}`; stable across regeneration runs.
pub fn slot_id(counsellor_id: Uuid, date: NaiveDate, period: Period, start: NaiveTime) -> String {
    format!(
        "{}_{}_{}_{}",
        counsellor_id,
        date,
        period.as_str(),
        start.format(CLOCK_FORMAT)
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSlot {
    pub id: String,
    pub period: Period,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

fn minutes_of(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn clock_at(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// Session start/end pairs fitting inside `window`, each followed by the fixed break.
pub fn session_ranges(window: PeriodWindow, duration_minutes: u32) -> Vec<(NaiveTime, NaiveTime)> {
    let mut ranges = Vec::new();
    if duration_minutes == 0 {
        return ranges;
    }

    let end_limit = minutes_of(window.end);
    let mut cursor = minutes_of(window.start);

    while let Some(session_end) = cursor.checked_add(duration_minutes) {
        if session_end > end_limit {
            break;
        }
        match (clock_at(cursor), clock_at(session_end)) {
            (Some(start), Some(end)) => ranges.push((start, end)),
            _ => break,
        }
        match session_end.checked_add(SESSION_BREAK_MINUTES) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    ranges
}

/// Every slot implied by the active periods, past ones included.
pub fn plan_slots(
    counsellor_id: Uuid,
    date: NaiveDate,
    active_periods: &[Period],
    config: &TimeConfig,
) -> Vec<PlannedSlot> {
    active_periods
        .iter()
        .filter_map(|period| config.window(*period).map(|window| (*period, window)))
        .flat_map(|(period, window)| {
            session_ranges(window, config.session_duration_minutes)
                .into_iter()
                .map(move |(start, end)| PlannedSlot {
                    id: slot_id(counsellor_id, date, period, start),
                    period,
                    start,
                    end,
                })
        })
        .collect()
}

/// Active periods that have no configured window and therefore produce no slots.
pub fn periods_without_window(active_periods: &[Period], config: &TimeConfig) -> Vec<Period> {
    active_periods
        .iter()
        .copied()
        .filter(|period| config.window(*period).is_none())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationPlan {
    pub to_create: Vec<PlannedSlot>,
    pub to_delete: Vec<String>,
    pub conflicts: Vec<SlotConflict>,
    pub unchanged: usize,
}

impl GenerationPlan {
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }
}

/// Compares the planned slots of one date with what the store already holds.
///
/// Missing slots are created only when they start strictly after `now_local`. Unbooked slots
/// whose end time drifted from the plan are rewritten. Unbooked slots outside the plan are
/// deleted; booked ones are left in place and reported as conflicts.
pub fn diff_against_existing(
    planned: Vec<PlannedSlot>,
    existing: &[TimeSlotEntity],
    date: NaiveDate,
    now_local: NaiveDateTime,
) -> GenerationPlan {
    let is_future = |start: NaiveTime| date.and_time(start) > now_local;
    let mut expected: HashMap<&str, &PlannedSlot> =
        planned.iter().map(|slot| (slot.id.as_str(), slot)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut plan = GenerationPlan::default();

    for slot in existing {
        match expected.remove(slot.id.as_str()) {
            Some(wanted) => {
                seen.insert(slot.id.clone());
                if !slot.is_booked && slot.end_time != wanted.end && is_future(wanted.start) {
                    plan.to_create.push(wanted.clone());
                } else {
                    plan.unchanged += 1;
                }
            }
            None if seen.contains(&slot.id) => {}
            None if slot.is_booked => plan.conflicts.push(SlotConflict::from_entity(slot)),
            None => plan.to_delete.push(slot.id.clone()),
        }
    }

    for slot in &planned {
        if expected.contains_key(slot.id.as_str()) && is_future(slot.start) {
            plan.to_create.push(slot.clone());
        }
    }

    plan.to_create.sort_by_key(|slot| (slot.start, slot.period));
    plan.to_delete.sort();
    plan
}

pub fn describe_range(start: NaiveTime, end: NaiveTime) -> String {
    format!("{}-{}", format_clock(start), format_clock(end))
}
