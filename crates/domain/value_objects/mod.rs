pub mod appointments;
pub mod clock;
pub mod enums;
pub mod meetings;
pub mod notifications;
pub mod principal;
pub mod schedule;
pub mod slot_plan;
pub mod time_slots;
