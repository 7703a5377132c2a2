pub mod appointment_mirrors;
pub mod appointments;
pub mod counsellors;
pub mod payments;
pub mod students;
pub mod time_slots;
