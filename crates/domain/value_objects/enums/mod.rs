pub mod appointment_statuses;
pub mod payment_statuses;
pub mod periods;
pub mod roles;
