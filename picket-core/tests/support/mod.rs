//! Shared fixtures for picket-core integration tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parking_lot::Mutex;
use picket_config::CoordinatorConfig;
use picket_core::scan_database::{MemoryScanDatabase, ScanDatabase, ScanDatabaseError};
use picket_core::task_engine::{
    ArtifactStore, ClientError, PlanRegistry, PluginServiceApi, TaskEngine,
};
use picket_model::{
    Configuration, ErrorCode, FileId, FileRecord, Issue, IssueId, IssueReport, PluginDescriptor,
    PluginSessionState, PluginSessionSummary, ScanId, ScanSummary, SessionCommand, SessionId,
    Severity,
};

/// A call the coordinator made against the Plugin Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create(String),
    Get(SessionId),
    Change(SessionId, SessionCommand),
    Results(SessionId),
    File(SessionId, FileId),
}

impl Call {
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Call::Create(_) => None,
            Call::Get(id) | Call::Change(id, _) | Call::Results(id) | Call::File(id, _) => {
                Some(*id)
            }
        }
    }

    pub fn is_action(&self) -> bool {
        matches!(self, Call::Change(..) | Call::Results(_))
    }
}

#[derive(Debug)]
struct FakeSession {
    summary: PluginSessionSummary,
    issues: Vec<Issue>,
    files: Vec<(FileRecord, Vec<u8>)>,
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: Vec<FakeSession>,
    calls: Vec<Call>,
    unreachable: bool,
}

/// In-memory Plugin Service that only records calls and applies START;
/// tests move sessions to other states themselves.
#[derive(Debug, Default)]
pub struct FakePluginService {
    state: Mutex<FakeState>,
}

impl FakePluginService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state.lock().calls)
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().unreachable = unreachable;
    }

    pub fn summary_of(&self, id: SessionId) -> PluginSessionSummary {
        self.with_session(id, |session| session.summary.clone())
    }

    pub fn state_of(&self, id: SessionId) -> PluginSessionState {
        self.with_session(id, |session| session.summary.state)
    }

    pub fn set_state(&self, id: SessionId, state: PluginSessionState) {
        self.with_session(id, |session| session.summary.state = state);
    }

    /// Append `count` issues dated after anything already reported.
    pub fn add_issues(&self, id: SessionId, count: usize) {
        self.with_session(id, |session| {
            let base = session
                .issues
                .last()
                .map(|issue| issue.date)
                .unwrap_or_else(Utc::now);
            for n in 1..=count {
                session.issues.push(Issue {
                    id: IssueId::new(),
                    date: base + TimeDelta::milliseconds(n as i64),
                    report: IssueReport::new(format!("finding {n}"), Severity::Low),
                });
            }
        });
    }

    pub fn add_file(&self, id: SessionId, name: &str, bytes: &[u8]) -> FileId {
        self.with_session(id, |session| {
            let record = FileRecord {
                id: FileId::new(),
                name: name.to_string(),
                path: format!("/tmp/{name}").into(),
            };
            session.summary.files.push(record.clone());
            session.files.push((record.clone(), bytes.to_vec()));
            record.id
        })
    }

    fn with_session<T>(&self, id: SessionId, f: impl FnOnce(&mut FakeSession) -> T) -> T {
        let mut state = self.state.lock();
        let session = state
            .sessions
            .iter_mut()
            .find(|session| session.summary.id == id)
            .expect("unknown fake session");
        f(session)
    }

    fn record(&self, call: Call) -> Result<(), ClientError> {
        let mut state = self.state.lock();
        if state.unreachable {
            return Err(ClientError::Status(reqwest::StatusCode::BAD_GATEWAY));
        }
        state.calls.push(call);
        Ok(())
    }
}

#[async_trait]
impl PluginServiceApi for FakePluginService {
    async fn create_session(
        &self,
        plugin_name: &str,
        configuration: &Configuration,
    ) -> Result<PluginSessionSummary, ClientError> {
        self.record(Call::Create(plugin_name.to_string()))?;
        if plugin_name == "MissingPlugin" {
            return Err(ClientError::Rejected(ErrorCode::NoSuchPlugin));
        }
        let summary = PluginSessionSummary {
            id: SessionId::new(),
            state: PluginSessionState::Created,
            plugin: PluginDescriptor {
                name: plugin_name.to_string(),
                version: "test".into(),
                class: format!("fake::{plugin_name}"),
            },
            configuration: configuration.clone(),
            progress: None,
            created: Utc::now(),
            started: None,
            finished: None,
            duration_ms: None,
            exit_code: None,
            files: Vec::new(),
            errors: Vec::new(),
        };
        self.state.lock().sessions.push(FakeSession {
            summary: summary.clone(),
            issues: Vec::new(),
            files: Vec::new(),
        });
        Ok(summary)
    }

    async fn get_session(&self, id: SessionId) -> Result<PluginSessionSummary, ClientError> {
        self.record(Call::Get(id))?;
        Ok(self.with_session(id, |session| session.summary.clone()))
    }

    async fn change_state(&self, id: SessionId, command: SessionCommand) -> Result<(), ClientError> {
        self.record(Call::Change(id, command))?;
        if command == SessionCommand::Start {
            self.set_state(id, PluginSessionState::Started);
        }
        Ok(())
    }

    async fn results(&self, id: SessionId) -> Result<Vec<Issue>, ClientError> {
        self.record(Call::Results(id))?;
        Ok(self.with_session(id, |session| session.issues.clone()))
    }

    async fn file(&self, id: SessionId, file: FileId) -> Result<Vec<u8>, ClientError> {
        self.record(Call::File(id, file))?;
        self.with_session(id, |session| {
            session
                .files
                .iter()
                .find(|(record, _)| record.id == file)
                .map(|(_, bytes)| bytes.clone())
                .ok_or(ClientError::Rejected(ErrorCode::NoSuchFile))
        })
    }
}

/// Memory database whose first `failures` stores fail.
#[derive(Debug, Default)]
pub struct FlakyDatabase {
    inner: MemoryScanDatabase,
    failures: AtomicUsize,
}

impl FlakyDatabase {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryScanDatabase::new(),
            failures: AtomicUsize::new(failures),
        })
    }
}

#[async_trait]
impl ScanDatabase for FlakyDatabase {
    async fn load(&self, id: ScanId) -> Result<Option<ScanSummary>, ScanDatabaseError> {
        self.inner.load(id).await
    }

    async fn store(&self, summary: &ScanSummary) -> Result<(), ScanDatabaseError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ScanDatabaseError::Worker("disk full".into()));
        }
        self.inner.store(summary).await
    }

    async fn delete(&self, id: ScanId) -> Result<bool, ScanDatabaseError> {
        self.inner.delete(id).await
    }
}

pub struct Harness {
    pub engine: TaskEngine,
    pub plugin_service: Arc<FakePluginService>,
    pub artifacts: tempfile::TempDir,
}

pub fn harness_with(database: Arc<dyn ScanDatabase>, stop_grace: Duration) -> Harness {
    let plugin_service = FakePluginService::new();
    let artifacts = tempfile::tempdir().expect("artifact dir");
    let engine = TaskEngine::new(
        CoordinatorConfig {
            // Tests drive ticks by hand.
            tick_interval: Duration::from_secs(3600),
            stop_grace,
        },
        PlanRegistry::builtin(),
        plugin_service.clone(),
        database,
        ArtifactStore::new(artifacts.path()),
    );
    Harness {
        engine,
        plugin_service,
        artifacts,
    }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MemoryScanDatabase::new()), Duration::from_secs(30))
}
