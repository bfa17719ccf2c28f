use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cadence_core::CadenceError;
use cadence_scheduler::SchedulerError;
use serde_json::json;
use tracing::error;

/// Error body returned by every handler: `{ "code": ..., "message": ... }`.
#[derive(Debug)]
pub enum ApiError {
    Scheduler(SchedulerError),
    Core(CadenceError),
}

impl From<SchedulerError> for ApiError {
    fn from(e: SchedulerError) -> Self {
        ApiError::Scheduler(e)
    }
}

impl From<CadenceError> for ApiError {
    fn from(e: CadenceError) -> Self {
        ApiError::Core(e)
    }
}

fn core_status(e: &CadenceError) -> StatusCode {
    match e {
        CadenceError::NotFound { .. } => StatusCode::NOT_FOUND,
        CadenceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Scheduler(e) => match e {
                SchedulerError::InvalidSchedule(_) => StatusCode::BAD_REQUEST,
                SchedulerError::NotFound { .. } => StatusCode::NOT_FOUND,
                SchedulerError::InvalidTransition { .. } | SchedulerError::LeaseLost { .. } => {
                    StatusCode::CONFLICT
                }
                SchedulerError::Collaborator(inner) => core_status(inner),
                SchedulerError::Database(_) | SchedulerError::LockPoisoned => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Core(e) => core_status(e),
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Scheduler(e) => e.code(),
            ApiError::Core(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Scheduler(e) => e.to_string(),
            ApiError::Core(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(code = self.code(), error = %message, "request failed");
        }
        (status, Json(json!({ "code": self.code(), "message": message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
