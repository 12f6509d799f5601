use std::path::PathBuf;

use picket_model::{ErrorCode, FileId, PluginSessionState, SessionCommand, SessionId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginServiceError {
    #[error("no such plugin: {0}")]
    NoSuchPlugin(String),

    #[error("no such session: {0}")]
    NoSuchSession(SessionId),

    #[error("cannot apply {command:?} to a session in state {state}")]
    UnknownStateTransition {
        state: PluginSessionState,
        command: SessionCommand,
    },

    #[error("session {0} is not running")]
    SessionNotRunning(SessionId),

    #[error("no such file {file} in session {session}")]
    NoSuchFile { session: SessionId, file: FileId },

    #[error("failed to read {path}")]
    FailedToReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("plugin service has shut down")]
    Unavailable,
}

impl PluginServiceError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NoSuchPlugin(_) => ErrorCode::NoSuchPlugin,
            Self::NoSuchSession(_) => ErrorCode::NoSuchSession,
            Self::UnknownStateTransition { .. } => ErrorCode::UnknownStateTransition,
            Self::SessionNotRunning(_) => ErrorCode::SessionNotRunning,
            Self::NoSuchFile { .. } => ErrorCode::NoSuchFile,
            Self::FailedToReadFile { .. } => ErrorCode::FailedToReadFile,
            Self::Unavailable => ErrorCode::InternalError,
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginServiceError>;
