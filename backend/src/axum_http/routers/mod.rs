use booking_core::domain::value_objects::clock::parse_date;
use chrono::NaiveDate;

use super::error_responses::AppError;

pub mod appointments;
pub mod payments;
pub mod schedule;
pub mod time_slots;

pub(crate) fn date_param(raw: &str) -> Result<NaiveDate, AppError> {
    parse_date(raw).map_err(|err| AppError::BadRequest(err.to_string()))
}
