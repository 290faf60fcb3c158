//! HTTP-facing error type.
//!
//! Domain errors from the store, the resolver and the relay are mapped onto
//! status codes here. Every API error body is JSON:
//! `{ "error": "...", "details": [{ "field": "...", "message": "..." }] }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::relay::RelayError;
use crate::tasks::{FieldError, TaskError};

/// An API failure with its status code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    details: Vec<FieldError>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<FieldError>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn invalid_json(err: &serde_json::Error) -> Self {
        Self::bad_request(format!("Invalid JSON body: {err}"))
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation failed".to_string(),
            details,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::NotFound { .. } => Self::not_found("Task not found"),
            TaskError::Validation(details) => Self::validation(details),
            TaskError::Persist { .. } | TaskError::Encode(_) => {
                error!(error = %err, "Task persistence failed");
                Self::internal(err)
            },
        }
    }
}

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::NotConnected | RelayError::Closed => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            },
            RelayError::Encode(_) => Self::internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.message,
            details: self.details,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_errors_map_to_statuses() {
        let not_found = ApiError::from(TaskError::NotFound {
            task_id: "x".to_string(),
        });
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let persist = ApiError::from(TaskError::Persist {
            path: "/data/tasks.json".to_string(),
            source: std::io::Error::other("disk full"),
        });
        assert_eq!(persist.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(persist.message.contains("disk full"));
    }

    #[test]
    fn relay_errors_are_service_unavailable() {
        let err = ApiError::from(RelayError::NotConnected);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
