use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use picket_config::PluginServiceConfig;
use picket_contracts::PluginCatalog;
use picket_model::{
    ArtifactReport, Configuration, FileId, FileRecord, Issue, IssueReport,
    PluginDescriptor, PluginSessionState, PluginSessionSummary, Progress,
    ReportedError, SessionCommand, SessionId,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::{PluginServiceError, Result};
use super::process::{self, ProcessExit, ProcessHandle};
use super::session::{PluginSession, StopReason};

const MAILBOX_CAPACITY: usize = 256;

/// A report pushed by a running plugin.
#[derive(Debug, Clone)]
pub enum SessionReport {
    Progress(Progress),
    Results(Vec<IssueReport>),
    Errors(Vec<ReportedError>),
    Artifacts(ArtifactReport),
    Finish,
}

enum Command {
    Create {
        plugin: String,
        configuration: Configuration,
        reply: oneshot::Sender<Result<PluginSessionSummary>>,
    },
    Get {
        id: SessionId,
        reply: oneshot::Sender<Result<PluginSessionSummary>>,
    },
    ChangeState {
        id: SessionId,
        command: SessionCommand,
        reply: oneshot::Sender<Result<()>>,
    },
    Results {
        id: SessionId,
        reply: oneshot::Sender<Result<(PluginSessionSummary, Vec<Issue>)>>,
    },
    File {
        id: SessionId,
        file: FileId,
        reply: oneshot::Sender<Result<FileRecord>>,
    },
    Configuration {
        id: SessionId,
        reply: oneshot::Sender<Result<Configuration>>,
    },
    Report {
        id: SessionId,
        report: SessionReport,
        reply: oneshot::Sender<Result<()>>,
    },
    ProcessExited {
        id: SessionId,
        exit: ProcessExit,
        reply: Option<oneshot::Sender<bool>>,
    },
    StopDeadline {
        id: SessionId,
    },
    WatchdogExpired {
        id: SessionId,
    },
}

/// Cloneable front door to the supervisor task.
#[derive(Clone, Debug)]
pub struct PluginServiceHandle {
    tx: mpsc::Sender<Command>,
    catalog: Arc<PluginCatalog>,
    shutdown: CancellationToken,
}

/// Supervisor task state. Every plugin session lives here and is only ever
/// touched from [`PluginService::run`].
pub struct PluginService {
    config: PluginServiceConfig,
    catalog: Arc<PluginCatalog>,
    sessions: HashMap<SessionId, PluginSession>,
    rx: mpsc::Receiver<Command>,
    events: mpsc::WeakSender<Command>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for PluginService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginService")
            .field("config", &self.config)
            .field("plugins", &self.catalog.len())
            .field("sessions", &self.sessions.len())
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl PluginService {
    /// Start the supervisor task and return a handle to it.
    pub fn spawn(
        config: PluginServiceConfig,
        catalog: PluginCatalog,
    ) -> (PluginServiceHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let catalog = Arc::new(catalog);
        let shutdown = CancellationToken::new();

        let service = PluginService {
            config,
            catalog: Arc::clone(&catalog),
            sessions: HashMap::new(),
            rx,
            events: tx.downgrade(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(service.run());

        (
            PluginServiceHandle {
                tx,
                catalog,
                shutdown,
            },
            task,
        )
    }

    async fn run(mut self) {
        info!(plugins = self.catalog.len(), "plugin service supervisor started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                command = self.rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        let running: Vec<_> = self
            .sessions
            .values()
            .filter(|session| session.is_running())
            .collect();
        if !running.is_empty() {
            warn!(count = running.len(), "killing plugin processes on shutdown");
        }
        for session in running {
            if let Some(process) = &session.process {
                process.kill();
            }
        }
        info!("plugin service supervisor stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Create {
                plugin,
                configuration,
                reply,
            } => {
                let _ = reply.send(self.create(&plugin, configuration));
            }
            Command::Get { id, reply } => {
                let _ = reply.send(self.session(id).map(|s| s.summary(Utc::now())));
            }
            Command::ChangeState { id, command, reply } => {
                let _ = reply.send(self.change_state(id, command));
            }
            Command::Results { id, reply } => {
                let _ = reply.send(
                    self.session(id)
                        .map(|s| (s.summary(Utc::now()), s.issues.clone())),
                );
            }
            Command::File { id, file, reply } => {
                let result = self.session(id).and_then(|session| {
                    session
                        .files
                        .iter()
                        .find(|record| record.id == file)
                        .cloned()
                        .ok_or(PluginServiceError::NoSuchFile { session: id, file })
                });
                let _ = reply.send(result);
            }
            Command::Configuration { id, reply } => {
                let _ = reply.send(self.session(id).map(|s| s.configuration.clone()));
            }
            Command::Report { id, report, reply } => {
                let _ = reply.send(self.report(id, report));
            }
            Command::ProcessExited { id, exit, reply } => {
                let finalized = self.process_exited(id, exit);
                if let Some(reply) = reply {
                    let _ = reply.send(finalized);
                }
            }
            Command::StopDeadline { id } => self.stop_deadline(id),
            Command::WatchdogExpired { id } => self.watchdog_expired(id),
        }
    }

    fn session(&self, id: SessionId) -> Result<&PluginSession> {
        self.sessions
            .get(&id)
            .ok_or(PluginServiceError::NoSuchSession(id))
    }

    fn session_mut(&mut self, id: SessionId) -> Result<&mut PluginSession> {
        self.sessions
            .get_mut(&id)
            .ok_or(PluginServiceError::NoSuchSession(id))
    }

    fn create(
        &mut self,
        plugin: &str,
        configuration: Configuration,
    ) -> Result<PluginSessionSummary> {
        let descriptor = self
            .catalog
            .descriptor(plugin)
            .cloned()
            .ok_or_else(|| PluginServiceError::NoSuchPlugin(plugin.to_string()))?;
        let session = PluginSession::new(descriptor, configuration, Utc::now());
        let summary = session.summary(Utc::now());
        info!(session_id = %session.id, plugin, "created plugin session");
        self.sessions.insert(session.id, session);
        Ok(summary)
    }

    fn change_state(&mut self, id: SessionId, command: SessionCommand) -> Result<()> {
        let state = self.session(id)?.state;
        let allowed = match command {
            SessionCommand::Start => state == PluginSessionState::Created,
            SessionCommand::Stop | SessionCommand::Terminate => {
                state == PluginSessionState::Started
            }
        };
        if !allowed {
            return Err(PluginServiceError::UnknownStateTransition { state, command });
        }

        match command {
            SessionCommand::Start => self.start(id),
            SessionCommand::Stop => self.stop(id, StopReason::Requested),
            SessionCommand::Terminate => self.terminate(id),
        }
    }

    fn start(&mut self, id: SessionId) -> Result<()> {
        let runner = self.config.runner.clone();
        let max_runtime = self.config.supervision.max_runtime;
        let events = self.events.clone();

        let session = self.session_mut(id)?;
        session.mark_started(Utc::now());

        let child = match process::spawn_runner(&runner, id, &session.plugin.name) {
            Ok(child) => child,
            Err(err) => {
                error!(session_id = %id, program = %runner.program, error = %err, "failed to spawn plugin runner");
                session.errors.push(
                    ReportedError::new("failed to start plugin process")
                        .with_details(err.to_string()),
                );
                session.finalize(ProcessExit::SpawnFailed, Utc::now());
                return Ok(());
            }
        };

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let pid = child.id();
        session.process = Some(ProcessHandle {
            pid,
            control: control_tx,
        });
        info!(session_id = %id, plugin = %session.plugin.name, pid, "started plugin process");

        tokio::spawn(async move {
            let exit = process::monitor(child, id, control_rx).await;
            if let Some(tx) = events.upgrade() {
                let _ = tx
                    .send(Command::ProcessExited {
                        id,
                        exit,
                        reply: None,
                    })
                    .await;
            }
        });

        if let Some(limit) = max_runtime {
            self.schedule(limit, Command::WatchdogExpired { id });
        }
        Ok(())
    }

    fn stop(&mut self, id: SessionId, reason: StopReason) -> Result<()> {
        let grace = self.config.supervision.stop_grace;
        let session = self.session_mut(id)?;
        if session.stop.is_none() {
            session.stop = Some(reason);
        }
        let attached = match &session.process {
            Some(process) => {
                info!(session_id = %id, ?reason, "stopping plugin process");
                process.request_stop(id);
                true
            }
            None => {
                warn!(session_id = %id, "stop requested but no process is attached");
                false
            }
        };
        if attached {
            self.schedule(grace, Command::StopDeadline { id });
        }
        Ok(())
    }

    fn terminate(&mut self, id: SessionId) -> Result<()> {
        let session = self.session_mut(id)?;
        // A watchdog stop already in progress keeps its reason.
        if session.stop.is_none() || session.stop == Some(StopReason::Requested) {
            session.stop = Some(StopReason::Terminated);
        }
        if let Some(process) = &session.process {
            info!(session_id = %id, "terminating plugin process");
            process.kill();
        }
        Ok(())
    }

    fn stop_deadline(&mut self, id: SessionId) {
        if let Some(session) = self.sessions.get(&id)
            && session.is_running()
            && let Some(process) = &session.process
        {
            warn!(session_id = %id, "plugin ignored stop request, killing");
            process.kill();
        }
    }

    fn watchdog_expired(&mut self, id: SessionId) {
        let running = self
            .sessions
            .get(&id)
            .is_some_and(|session| session.is_running());
        if running {
            warn!(session_id = %id, "plugin exceeded maximum runtime");
            if let Some(session) = self.sessions.get_mut(&id) {
                session.stop = Some(StopReason::Watchdog);
            }
            if let Err(err) = self.stop(id, StopReason::Watchdog) {
                error!(session_id = %id, error = %err, "failed to stop expired plugin");
            }
        }
    }

    fn report(&mut self, id: SessionId, report: SessionReport) -> Result<()> {
        let session = self.session_mut(id)?;
        if !session.is_running() {
            return Err(PluginServiceError::SessionNotRunning(id));
        }
        match report {
            SessionReport::Progress(progress) => {
                debug!(session_id = %id, percentage = progress.percentage, "progress");
                session.progress = Some(progress);
            }
            SessionReport::Results(issues) => {
                let count = session.ingest_results(issues, Utc::now());
                debug!(session_id = %id, count, "ingested issues");
            }
            SessionReport::Errors(errors) => {
                warn!(session_id = %id, count = errors.len(), "plugin reported errors");
                session.errors.extend(errors);
            }
            SessionReport::Artifacts(artifact) => {
                debug!(session_id = %id, name = %artifact.name, files = artifact.paths.len(), "artifacts");
                session.add_artifacts(artifact);
            }
            SessionReport::Finish => {
                debug!(session_id = %id, "plugin reported finish");
                session.finish_reported = true;
            }
        }
        Ok(())
    }

    fn process_exited(&mut self, id: SessionId, exit: ProcessExit) -> bool {
        let Some(session) = self.sessions.get_mut(&id) else {
            warn!(session_id = %id, "exit notification for unknown session");
            return false;
        };
        let now = Utc::now();
        if !session.finalize(exit, now) {
            debug!(session_id = %id, ?exit, "ignoring duplicate exit notification");
            return false;
        }
        info!(
            session_id = %id,
            plugin = %session.plugin.name,
            state = %session.state,
            ?exit,
            duration_ms = session.duration_ms(now),
            issues = session.issues.len(),
            "plugin session finished"
        );
        true
    }

    fn schedule(&self, after: std::time::Duration, command: Command) {
        let Some(tx) = self.events.upgrade() else {
            return;
        };
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(after) => {
                    let _ = tx.send(command).await;
                }
            }
        });
    }
}

impl PluginServiceHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> std::result::Result<T, PluginServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| PluginServiceError::Unavailable)?;
        rx.await.map_err(|_| PluginServiceError::Unavailable)
    }

    pub fn plugins(&self) -> Vec<PluginDescriptor> {
        self.catalog.descriptors()
    }

    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    pub async fn create(
        &self,
        plugin: &str,
        configuration: Configuration,
    ) -> Result<PluginSessionSummary> {
        let plugin = plugin.to_string();
        self.request(|reply| Command::Create {
            plugin,
            configuration,
            reply,
        })
        .await?
    }

    pub async fn get(&self, id: SessionId) -> Result<PluginSessionSummary> {
        self.request(|reply| Command::Get { id, reply }).await?
    }

    pub async fn change_state(&self, id: SessionId, command: SessionCommand) -> Result<()> {
        self.request(|reply| Command::ChangeState { id, command, reply })
            .await?
    }

    pub async fn results(&self, id: SessionId) -> Result<(PluginSessionSummary, Vec<Issue>)> {
        self.request(|reply| Command::Results { id, reply }).await?
    }

    /// Raw bytes of a reported artifact file. The read happens on the
    /// blocking pool, off the supervisor task.
    pub async fn file(&self, id: SessionId, file: FileId) -> Result<(FileRecord, Vec<u8>)> {
        let record = self
            .request(|reply| Command::File { id, file, reply })
            .await??;
        match tokio::fs::read(&record.path).await {
            Ok(bytes) => Ok((record, bytes)),
            Err(source) => {
                error!(session_id = %id, path = %record.path.display(), error = %source, "failed to read artifact");
                Err(PluginServiceError::FailedToReadFile {
                    path: record.path,
                    source,
                })
            }
        }
    }

    pub async fn configuration(&self, id: SessionId) -> Result<Configuration> {
        self.request(|reply| Command::Configuration { id, reply })
            .await?
    }

    pub async fn report(&self, id: SessionId, report: SessionReport) -> Result<()> {
        self.request(|reply| Command::Report { id, report, reply })
            .await?
    }

    /// Deliver a process-exit notification. Returns whether it finalized the
    /// session; duplicates return `false`.
    pub async fn notify_exit(&self, id: SessionId, exit: ProcessExit) -> Result<bool> {
        self.request(|reply| Command::ProcessExited {
            id,
            exit,
            reply: Some(reply),
        })
        .await
    }

    /// Stop the supervisor, killing any running plugin processes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
