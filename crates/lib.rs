pub mod domain;
pub mod infra;
pub mod meetings;
pub mod notifications;
pub mod observability;
pub mod payments;
