use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use picket_core::{PluginServiceError, TaskEngineError, task_engine::ClientError};
use picket_model::{ApiResponse, ErrorCode};
use std::fmt;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

/// Failure answered as `{success: false, error: <code>}` with a status that
/// reflects the failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: ErrorCode,
}

impl ApiError {
    pub fn new(status: StatusCode, code: ErrorCode) -> Self {
        Self { status, code }
    }

    pub fn bad_request(code: ErrorCode) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code)
    }

    pub fn not_found(code: ErrorCode) -> Self {
        Self::new(StatusCode::NOT_FOUND, code)
    }

    pub fn conflict(code: ErrorCode) -> Self {
        Self::new(StatusCode::CONFLICT, code)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::InternalError)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code, self.status)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = Json(ApiResponse::<()>::error(self.code));
        (self.status, payload).into_response()
    }
}

impl From<PluginServiceError> for ApiError {
    fn from(err: PluginServiceError) -> Self {
        let code = err.code();
        match &err {
            PluginServiceError::NoSuchPlugin(_)
            | PluginServiceError::NoSuchSession(_)
            | PluginServiceError::NoSuchFile { .. } => Self::not_found(code),
            PluginServiceError::UnknownStateTransition { .. }
            | PluginServiceError::SessionNotRunning(_) => Self::conflict(code),
            PluginServiceError::FailedToReadFile { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
            }
            PluginServiceError::Unavailable => {
                error!(error = %err, "plugin service supervisor is gone");
                Self::new(StatusCode::SERVICE_UNAVAILABLE, code)
            }
        }
    }
}

impl From<TaskEngineError> for ApiError {
    fn from(err: TaskEngineError) -> Self {
        let code = err.code();
        match &err {
            TaskEngineError::NoSuchPlan(_) | TaskEngineError::NoSuchScan(_) => {
                Self::not_found(code)
            }
            TaskEngineError::InvalidStateTransition { .. } => Self::conflict(code),
            TaskEngineError::InvalidToken => Self::bad_request(code),
            TaskEngineError::PluginService(ClientError::Rejected(_)) => {
                warn!(error = %err, "plugin service rejected a request");
                Self::new(StatusCode::BAD_GATEWAY, code)
            }
            TaskEngineError::PluginService(_) => {
                warn!(error = %err, "plugin service unavailable");
                Self::new(StatusCode::BAD_GATEWAY, code)
            }
            TaskEngineError::ShuttingDown => Self::new(StatusCode::SERVICE_UNAVAILABLE, code),
            TaskEngineError::Storage(_) | TaskEngineError::Plans(_) => {
                error!(error = %err, "task engine request failed");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, code)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        warn!(reason = %rejection.body_text(), "rejected request body");
        Self::bad_request(ErrorCode::MalformedRequest)
    }
}

/// `Json` extractor whose rejection is an envelope rather than plain text.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);
