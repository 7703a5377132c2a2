pub mod expire_pending_appointments;
pub mod rolling_slot_generation;
