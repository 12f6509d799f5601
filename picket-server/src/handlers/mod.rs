pub mod plugin_service;
pub mod task_engine;

use axum::body::Bytes;
use picket_model::{Configuration, ErrorCode, ScanId, SessionId};

use crate::errors::{ApiError, ApiResult};

pub(crate) fn parse_session_id(raw: &str) -> ApiResult<SessionId> {
    SessionId::parse(raw).map_err(|_| ApiError::bad_request(ErrorCode::InvalidSessionId))
}

pub(crate) fn parse_scan_id(raw: &str) -> ApiResult<ScanId> {
    ScanId::parse(raw).map_err(|_| ApiError::bad_request(ErrorCode::InvalidScanId))
}

/// Configuration object from a create request. An empty body means `{}`.
pub(crate) fn parse_configuration(body: &Bytes) -> ApiResult<Configuration> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Configuration::new());
    }
    serde_json::from_slice(body)
        .map_err(|_| ApiError::bad_request(ErrorCode::InvalidConfiguration))
}
