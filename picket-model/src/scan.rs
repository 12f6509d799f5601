use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Configuration;
use crate::cursor::ResultsCursor;
use crate::error::ModelError;
use crate::ids::{ScanId, SessionId};
use crate::issue::{FileRecord, Issue, Progress, ReportedError};
use crate::plan::Plan;
use crate::session::{
    PluginDescriptor, PluginSessionState, PluginSessionSummary, unquote,
};

/// Lifecycle of a Task Engine scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanState {
    Created,
    Started,
    Stopping,
    Stopped,
    Finished,
}

impl ScanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Finished)
    }

    /// States the coordinator advances.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Started | Self::Stopping)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Started => "STARTED",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Finished => "FINISHED",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control command accepted by `POST /scan/{id}/state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScanCommand {
    Start,
    Stop,
}

impl FromStr for ScanCommand {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match unquote(s) {
            "START" => Ok(Self::Start),
            "STOP" => Ok(Self::Stop),
            other => Err(ModelError::UnknownState(other.to_string())),
        }
    }
}

/// The Task Engine's mirror of one remote plugin session.
///
/// `done` means the terminal state was observed and the final results were
/// collected; it is distinct from the remote state being terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSessionRef {
    pub id: SessionId,
    pub plugin: PluginDescriptor,
    pub state: PluginSessionState,
    #[serde(default)]
    pub progress: Option<Progress>,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub errors: Vec<ReportedError>,
    #[serde(default)]
    pub files: Vec<FileRecord>,
    #[serde(default)]
    pub artifacts: bool,
    #[serde(rename = "_done", default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_requested_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub terminate_sent: bool,
}

impl PluginSessionRef {
    pub fn from_summary(summary: &PluginSessionSummary) -> Self {
        let mut session = Self {
            id: summary.id,
            plugin: summary.plugin.clone(),
            state: summary.state,
            progress: None,
            issues: Vec::new(),
            errors: Vec::new(),
            files: Vec::new(),
            artifacts: false,
            done: false,
            stop_requested_at: None,
            terminate_sent: false,
        };
        session.apply_summary(summary);
        session
    }

    /// Refresh the mirrored fields from a remote snapshot. Issues are not part
    /// of the snapshot and are left untouched.
    pub fn apply_summary(&mut self, summary: &PluginSessionSummary) {
        self.state = summary.state;
        self.progress = summary.progress.clone();
        self.errors = summary.errors.clone();
        self.files = summary.files.clone();
        self.artifacts = !summary.files.is_empty();
    }

    /// Replace the issue list with the full remote list.
    pub fn apply_results(&mut self, issues: Vec<Issue>) {
        self.issues = issues;
    }

    fn issues_after(&self, since: &ResultsCursor) -> Vec<Issue> {
        self.issues
            .iter()
            .filter(|issue| issue.date > since.instant())
            .cloned()
            .collect()
    }
}

/// Full scan record; also the snapshot persisted to the scan database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub id: ScanId,
    pub state: ScanState,
    pub plan: Plan,
    pub configuration: Configuration,
    pub sessions: Vec<PluginSessionRef>,
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub started: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished: Option<DateTime<Utc>>,
}

impl ScanSummary {
    pub fn all_done(&self) -> bool {
        self.sessions.iter().all(|session| session.done)
    }

    /// Issues newer than `since`, per session, plus the token to continue
    /// from. The token is omitted once every session is done.
    pub fn results_since(
        &self,
        since: &ResultsCursor,
    ) -> (ScanResults, Option<ResultsCursor>) {
        let mut newest = *since;
        let sessions = self
            .sessions
            .iter()
            .map(|session| {
                let issues = session.issues_after(since);
                if let Some(max) = issues.iter().map(|issue| issue.date).max() {
                    newest = newest.max(ResultsCursor::at(max));
                }
                SessionResultsView {
                    id: session.id,
                    plugin: session.plugin.clone(),
                    state: session.state,
                    progress: session.progress.clone(),
                    issues,
                }
            })
            .collect();

        let results = ScanResults {
            id: self.id,
            state: self.state,
            sessions,
        };
        let token = if self.all_done() { None } else { Some(newest) };
        (results, token)
    }
}

/// Condensed scan view returned by the incremental results endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    pub id: ScanId,
    pub state: ScanState,
    pub sessions: Vec<SessionResultsView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResultsView {
    pub id: SessionId,
    pub plugin: PluginDescriptor,
    pub state: PluginSessionState,
    #[serde(default)]
    pub progress: Option<Progress>,
    pub issues: Vec<Issue>,
}
