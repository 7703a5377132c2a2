use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::usecases::ReasonedError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub reason: String,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{message}")]
    UseCase {
        status: StatusCode,
        reason: &'static str,
        message: String,
    },

    #[error("Internal server error")]
    Internal,
}

impl AppError {
    pub fn from_usecase<E: ReasonedError>(err: &E) -> Self {
        let status = err.status_code();
        if status.is_server_error() {
            return AppError::Internal;
        }
        AppError::UseCase {
            status,
            reason: err.reason(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, reason, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::UseCase {
                status,
                reason,
                message,
            } => (status, reason, message),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "Internal server error".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            code: status.as_u16(),
            reason: reason.to_string(),
            message,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    enum SampleError {
        #[error("slot already booked")]
        Booked,
        #[error("database exploded: {0}")]
        Internal(String),
    }

    impl ReasonedError for SampleError {
        fn status_code(&self) -> StatusCode {
            match self {
                SampleError::Booked => StatusCode::CONFLICT,
                SampleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }

        fn reason(&self) -> &'static str {
            match self {
                SampleError::Booked => "slot_already_booked",
                SampleError::Internal(_) => "internal_error",
            }
        }
    }

    #[test]
    fn client_errors_keep_reason_and_message() {
        match AppError::from_usecase(&SampleError::Booked) {
            AppError::UseCase {
                status,
                reason,
                message,
            } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(reason, "slot_already_booked");
                assert_eq!(message, "slot already booked");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::from_usecase(&SampleError::Internal("password=hunter2".into()));
        assert!(matches!(err, AppError::Internal));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
