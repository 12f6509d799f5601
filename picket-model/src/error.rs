use thiserror::Error;

/// Errors produced by model parsing and validation routines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("malformed identifier: {0}")]
    InvalidId(String),

    #[error("unknown state: {0}")]
    UnknownState(String),

    #[error("malformed results token")]
    InvalidToken,
}

pub type Result<T> = std::result::Result<T, ModelError>;
