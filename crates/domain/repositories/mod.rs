pub mod appointments;
pub mod counsellors;
pub mod meetings;
pub mod notifications;
pub mod payments;
pub mod students;
pub mod time_slots;
