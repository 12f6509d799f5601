use async_trait::async_trait;
use picket_model::{ArtifactReport, IssueReport, Progress, ReportedError};
use thiserror::Error;
use tokio::sync::mpsc;

/// Failure delivering a report to the Plugin Service.
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("plugin service rejected report: {0}")]
    Rejected(String),

    #[error("plugin service unreachable: {0}")]
    Transport(String),
}

/// One upward message from a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    Progress(Progress),
    Results(Vec<IssueReport>),
    Errors(Vec<ReportedError>),
    Artifacts(ArtifactReport),
    Finish,
    /// The plugin wants its process to end with this exit code.
    Abort(i32),
}

/// The fixed capability set every plugin reports through.
#[async_trait]
pub trait PluginCallbacks: Send + Sync {
    async fn report_progress(&self, progress: Progress) -> Result<(), CallbackError>;

    async fn report_results(&self, issues: Vec<IssueReport>) -> Result<(), CallbackError>;

    async fn report_errors(&self, errors: Vec<ReportedError>) -> Result<(), CallbackError>;

    async fn report_artifacts(&self, artifact: ArtifactReport) -> Result<(), CallbackError>;

    async fn report_finish(&self) -> Result<(), CallbackError>;

    /// Request process exit with `exit_code`. Implementations record the code;
    /// the runner performs the exit.
    async fn report_abort(&self, exit_code: i32) -> Result<(), CallbackError>;

    async fn dispatch(&self, report: Report) -> Result<(), CallbackError> {
        match report {
            Report::Progress(progress) => self.report_progress(progress).await,
            Report::Results(issues) => self.report_results(issues).await,
            Report::Errors(errors) => self.report_errors(errors).await,
            Report::Artifacts(artifact) => self.report_artifacts(artifact).await,
            Report::Finish => self.report_finish().await,
            Report::Abort(code) => self.report_abort(code).await,
        }
    }
}

/// Cheap, cloneable handle plugins use to report.
///
/// Sending never blocks, so the same handle works from worker threads
/// running blocking plugin bodies and from async code. Reports are delivered
/// in the order they were sent.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: mpsc::UnboundedSender<Report>,
}

impl Reporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, report: Report) {
        if self.tx.send(report).is_err() {
            tracing::debug!("report dropped, forwarder has shut down");
        }
    }

    pub fn report_progress(&self, percentage: f32, description: impl Into<String>) {
        self.send(Report::Progress(Progress::new(percentage, description)));
    }

    pub fn report_results(&self, issues: Vec<IssueReport>) {
        if !issues.is_empty() {
            self.send(Report::Results(issues));
        }
    }

    pub fn report_issue(&self, issue: IssueReport) {
        self.send(Report::Results(vec![issue]));
    }

    pub fn report_errors(&self, errors: Vec<ReportedError>) {
        if !errors.is_empty() {
            self.send(Report::Errors(errors));
        }
    }

    pub fn report_artifacts(
        &self,
        name: impl Into<String>,
        paths: Vec<std::path::PathBuf>,
    ) {
        self.send(Report::Artifacts(ArtifactReport {
            name: name.into(),
            paths,
        }));
    }

    pub fn report_finish(&self) {
        self.send(Report::Finish);
    }

    pub fn report_abort(&self, exit_code: i32) {
        self.send(Report::Abort(exit_code));
    }
}
