use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::time_slots::TimeSlotRange;

pub const MEETING_DURATION_MINUTES: u32 = 45;
pub const DEFAULT_MEETING_TOPIC: &str = "Counselling Session";

#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub host_email: String,
    pub date: NaiveDate,
    pub time_slot: TimeSlotRange,
    pub topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MeetingLink {
    pub meeting_id: String,
    pub join_url: String,
    pub start_url: String,
}
