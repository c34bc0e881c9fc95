//! Error rendering for the HTTP gateway.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use schedbridge_slurm::{AdapterError, ErrorCode};

use crate::rest::types::ErrorResponse;

/// An operation failure as returned to clients.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self {
            code: ErrorCode::InvalidArgument,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        status_of(self.code)
    }
}

impl From<AdapterError> for ApiError {
    fn from(err: AdapterError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// HTTP status carrying an error code.
pub fn status_of(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::AlreadyExists => StatusCode::CONFLICT,
        ErrorCode::InvalidArgument => StatusCode::BAD_REQUEST,
        ErrorCode::Internal | ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                error: self.message,
                code: self.code.as_str().to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::from(AdapterError::JobNotFound(7));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.message, "Job not found: 7");

        let err = ApiError::from(AdapterError::AccountExists("acme".into()));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(AdapterError::Scheduler("sbatch: error".into()));
        assert_eq!(err.code, ErrorCode::Unknown);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(
            ApiError::invalid_argument("bad").status(),
            StatusCode::BAD_REQUEST
        );
    }
}
