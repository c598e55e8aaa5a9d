use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError, services::question_bank::QuestionBankError,
    state::game::SessionError,
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Missing or unknown credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Authenticated, but not allowed to perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// The session has no room left.
    #[error("{0}")]
    CapacityExceeded(String),
    /// The feature is switched off in the configuration.
    #[error("not implemented: {0}")]
    NotImplemented(String),
    /// Unexpected persistence failure (conflicting write, corrupt record).
    #[error("internal error: {0}")]
    Internal(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl ServiceError {
    /// Stable machine-readable code, sent in WebSocket error frames and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unavailable(_) => "unavailable",
            ServiceError::Degraded => "degraded",
            ServiceError::Unauthorized(_) => "unauthorized",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::InvalidState(_) => "invalid_state",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::CapacityExceeded(_) => "capacity_exceeded",
            ServiceError::NotImplemented(_) => "not_implemented",
            ServiceError::Internal(_) => "internal",
            ServiceError::Timeout => "timeout",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Unavailable { .. } => ServiceError::Unavailable(err),
            StorageError::Conflict { .. } | StorageError::Corrupt { .. } => {
                ServiceError::Internal(err.to_string())
            }
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::SessionFull { capacity } => ServiceError::CapacityExceeded(format!(
                "Diese Sitzung ist bereits voll ({capacity} player(s) max)"
            )),
            SessionError::NotJoinable(_)
            | SessionError::NoHeartsLeft
            | SessionError::InvalidTransition(_) => ServiceError::InvalidState(err.to_string()),
            SessionError::IndexOutOfRange { .. } => ServiceError::InvalidInput(err.to_string()),
            SessionError::NotParticipant(_) | SessionError::NotHost => {
                ServiceError::Forbidden(err.to_string())
            }
        }
    }
}

impl From<QuestionBankError> for ServiceError {
    fn from(err: QuestionBankError) -> Self {
        match err {
            QuestionBankError::QuizNotFound(_) | QuestionBankError::TopicNotFound(_) => {
                ServiceError::NotFound(err.to_string())
            }
            QuestionBankError::Empty | QuestionBankError::NotPublished(_) => {
                ServiceError::InvalidInput(err.to_string())
            }
            QuestionBankError::Storage(source) => source.into(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("{0}")]
    BadRequest(String),
    /// Missing or unknown bearer token.
    #[error("{0}")]
    Unauthorized(String),
    /// Caller may not perform the action.
    #[error("{0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("{0}")]
    Conflict(String),
    /// Session is full.
    #[error("{0}")]
    CapacityExceeded(String),
    /// Feature switched off.
    #[error("{0}")]
    NotImplemented(String),
    /// Service unavailable or degraded.
    #[error("{0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::CapacityExceeded(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "invalid_input",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "invalid_state",
            AppError::CapacityExceeded(_) => "capacity_exceeded",
            AppError::NotImplemented(_) => "not_implemented",
            AppError::ServiceUnavailable(_) => "unavailable",
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Unauthorized(message),
            ServiceError::Forbidden(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::CapacityExceeded(message) => AppError::CapacityExceeded(message),
            ServiceError::NotImplemented(message) => AppError::NotImplemented(message),
            ServiceError::Internal(message) => AppError::Internal(message),
            ServiceError::Timeout => AppError::ServiceUnavailable("operation timed out".into()),
        }
    }
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human readable reason.
    pub detail: String,
    /// Stable machine-readable code.
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let payload = Json(ErrorBody {
            detail: self.to_string(),
            code: self.code().to_owned(),
        });

        (self.status(), payload).into_response()
    }
}
