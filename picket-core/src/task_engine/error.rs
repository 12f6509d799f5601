use picket_model::{ErrorCode, ScanId, ScanState};
use thiserror::Error;

use super::client::ClientError;
use super::plans::PlanFileError;
use crate::scan_database::ScanDatabaseError;

#[derive(Debug, Error)]
pub enum TaskEngineError {
    #[error("no plan named `{0}`")]
    NoSuchPlan(String),

    #[error("no scan {0}")]
    NoSuchScan(ScanId),

    #[error("cannot {command} a scan that is {state}")]
    InvalidStateTransition {
        state: ScanState,
        command: &'static str,
    },

    #[error("malformed results token")]
    InvalidToken,

    #[error(transparent)]
    PluginService(#[from] ClientError),

    #[error(transparent)]
    Storage(#[from] ScanDatabaseError),

    #[error(transparent)]
    Plans(#[from] PlanFileError),

    #[error("task engine is shutting down")]
    ShuttingDown,
}

impl TaskEngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TaskEngineError::NoSuchPlan(_) => ErrorCode::NoSuchPlan,
            TaskEngineError::NoSuchScan(_) => ErrorCode::NoSuchScan,
            TaskEngineError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            TaskEngineError::InvalidToken => ErrorCode::InvalidToken,
            TaskEngineError::PluginService(ClientError::Rejected(code)) => *code,
            TaskEngineError::PluginService(_) => ErrorCode::PluginServiceUnavailable,
            TaskEngineError::Storage(_)
            | TaskEngineError::Plans(_)
            | TaskEngineError::ShuttingDown => ErrorCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskEngineError>;
