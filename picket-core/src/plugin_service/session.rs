use chrono::{DateTime, Duration, Utc};
use picket_contracts::{EXIT_CODE_ABORTED, EXIT_CODE_SUCCESS};
use picket_model::{
    ArtifactReport, Configuration, FileId, FileRecord, Issue, IssueId, IssueReport,
    PluginDescriptor, PluginSessionState, PluginSessionSummary, Progress,
    ReportedError, SessionId,
};

use super::process::{ProcessExit, ProcessHandle};

/// Why a stop was initiated by the supervisor side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Cooperative STOP command.
    Requested,
    /// Forced TERMINATE command.
    Terminated,
    /// Maximum runtime exceeded.
    Watchdog,
}

/// The Plugin Service's authoritative record of one plugin execution.
#[derive(Debug)]
pub struct PluginSession {
    pub id: SessionId,
    pub plugin: PluginDescriptor,
    pub configuration: Configuration,
    pub state: PluginSessionState,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub issues: Vec<Issue>,
    pub errors: Vec<ReportedError>,
    pub progress: Option<Progress>,
    pub files: Vec<FileRecord>,
    pub finish_reported: bool,
    pub stop: Option<StopReason>,
    last_issue_date: Option<DateTime<Utc>>,
    pub(crate) process: Option<ProcessHandle>,
}

impl PluginSession {
    pub fn new(plugin: PluginDescriptor, configuration: Configuration, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            plugin,
            configuration,
            state: PluginSessionState::Created,
            created: now,
            started: None,
            finished: None,
            exit_code: None,
            issues: Vec::new(),
            errors: Vec::new(),
            progress: None,
            files: Vec::new(),
            finish_reported: false,
            stop: None,
            last_issue_date: None,
            process: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == PluginSessionState::Started && self.finished.is_none()
    }

    pub fn is_finalized(&self) -> bool {
        self.finished.is_some()
    }

    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.state = PluginSessionState::Started;
        self.started = Some(now);
    }

    /// Milliseconds from START to finalization, or to `now` while running.
    pub fn duration_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        let started = self.started?;
        let end = self.finished.unwrap_or(now);
        Some((end - started).num_milliseconds().max(0) as u64)
    }

    pub fn summary(&self, now: DateTime<Utc>) -> PluginSessionSummary {
        PluginSessionSummary {
            id: self.id,
            state: self.state,
            plugin: self.plugin.clone(),
            configuration: self.configuration.clone(),
            progress: self.progress.clone(),
            created: self.created,
            started: self.started,
            finished: self.finished,
            duration_ms: self.duration_ms(now),
            exit_code: self.exit_code,
            files: self.files.clone(),
            errors: self.errors.clone(),
        }
    }

    /// Append reported issues, assigning ids and ingestion timestamps.
    ///
    /// Timestamps strictly increase in assignment order, even when the wall
    /// clock stalls or steps backwards.
    pub fn ingest_results(&mut self, reports: Vec<IssueReport>, now: DateTime<Utc>) -> usize {
        let count = reports.len();
        for report in reports {
            let date = match self.last_issue_date {
                Some(last) if last >= now => last + Duration::nanoseconds(1),
                _ => now,
            };
            self.last_issue_date = Some(date);
            self.issues.push(Issue {
                id: IssueId::new(),
                date,
                report,
            });
        }
        count
    }

    /// Register one retrievable file per reported path.
    pub fn add_artifacts(&mut self, artifact: ArtifactReport) {
        for path in artifact.paths {
            self.files.push(FileRecord {
                id: FileId::new(),
                name: artifact.name.clone(),
                path,
            });
        }
    }

    /// Freeze the session after its process ended. Returns `false`, changing
    /// nothing, if the session was already finalized or never started.
    pub fn finalize(&mut self, exit: ProcessExit, now: DateTime<Utc>) -> bool {
        if self.is_finalized() || self.state != PluginSessionState::Started {
            return false;
        }

        self.state = final_state(exit, self.finish_reported, self.stop);
        self.exit_code = exit.code();
        self.finished = Some(now);
        self.process = None;
        if self.stop == Some(StopReason::Watchdog) {
            self.errors
                .push(ReportedError::new("plugin exceeded its maximum runtime"));
        }
        true
    }
}

/// Map a process ending to the session's terminal state.
pub fn final_state(
    exit: ProcessExit,
    finish_reported: bool,
    stop: Option<StopReason>,
) -> PluginSessionState {
    match (stop, exit) {
        (Some(StopReason::Watchdog), _) => PluginSessionState::Failed,
        (Some(_), _) => PluginSessionState::Stopped,
        (None, ProcessExit::Code(EXIT_CODE_SUCCESS)) if finish_reported => {
            PluginSessionState::Finished
        }
        (None, ProcessExit::Code(EXIT_CODE_ABORTED)) => PluginSessionState::Aborted,
        _ => PluginSessionState::Failed,
    }
}
