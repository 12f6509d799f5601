use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Configuration;
use crate::error::ModelError;
use crate::ids::SessionId;
use crate::issue::{FileRecord, Progress, ReportedError};

/// Lifecycle of one plugin session as tracked by the Plugin Service.
///
/// Terminal states never transition back to `Created` or `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PluginSessionState {
    Created,
    Started,
    Finished,
    Aborted,
    Failed,
    Stopped,
}

impl PluginSessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Finished | Self::Aborted | Self::Failed | Self::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::Finished => "FINISHED",
            Self::Aborted => "ABORTED",
            Self::Failed => "FAILED",
            Self::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for PluginSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control command accepted by `PUT /session/{id}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionCommand {
    Start,
    Stop,
    Terminate,
}

impl FromStr for SessionCommand {
    type Err = ModelError;

    /// Accepts the bare word or a JSON string literal, ignoring surrounding
    /// whitespace.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match unquote(s) {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            "TERMINATE" => Ok(Self::Terminate),
            other => Err(ModelError::UnknownState(other.to_string())),
        }
    }
}

pub(crate) fn unquote(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
}

/// Identity of an installed plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub name: String,
    pub version: String,
    pub class: String,
}

/// Snapshot of a plugin session as returned by the Plugin Service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSessionSummary {
    pub id: SessionId,
    pub state: PluginSessionState,
    pub plugin: PluginDescriptor,
    pub configuration: Configuration,
    #[serde(default)]
    pub progress: Option<Progress>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
    /// Milliseconds between START and finalization, set once. While running
    /// this is the elapsed time so far.
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub errors: Vec<ReportedError>,
}
