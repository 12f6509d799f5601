use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use picket_config::{CoordinatorConfig, TaskEngineConfig};
use picket_model::{
    Configuration, Plan, PlanDescription, PluginSessionRef, ResultsCursor, ScanId, ScanResults,
    ScanState, ScanSummary,
};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::artifacts::ArtifactStore;
use super::client::{HttpPluginServiceClient, PluginServiceApi};
use super::error::{Result, TaskEngineError};
use super::plans::PlanRegistry;
use crate::scan_database::{self, ScanDatabase};

pub(super) type ActiveScan = Arc<tokio::sync::Mutex<ScanSummary>>;

/// Cloneable handle to the workflow coordinator.
#[derive(Clone)]
pub struct TaskEngine {
    inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) coordinator: CoordinatorConfig,
    pub(super) plans: PlanRegistry,
    pub(super) plugin_service: Arc<dyn PluginServiceApi>,
    pub(super) database: Arc<dyn ScanDatabase>,
    pub(super) artifacts: ArtifactStore,
    pub(super) active: RwLock<HashMap<ScanId, ActiveScan>>,
    create_gate: Semaphore,
    ticker: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl fmt::Debug for TaskEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = &self.inner;
        f.debug_struct("TaskEngine")
            .field("coordinator", &inner.coordinator)
            .field("plans", &inner.plans.len())
            .field("plugin_service", &inner.plugin_service)
            .field("database", &inner.database)
            .field("artifacts", &inner.artifacts.root())
            .field("active_scans", &inner.active.read().len())
            .field("ticking", &inner.ticker.lock().is_some())
            .field("shutdown_cancelled", &inner.shutdown.is_cancelled())
            .finish()
    }
}

impl TaskEngine {
    pub fn new(
        coordinator: CoordinatorConfig,
        plans: PlanRegistry,
        plugin_service: Arc<dyn PluginServiceApi>,
        database: Arc<dyn ScanDatabase>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                coordinator,
                plans,
                plugin_service,
                database,
                artifacts,
                active: RwLock::new(HashMap::new()),
                create_gate: Semaphore::new(1),
                ticker: Mutex::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Wire the production collaborators described by `config`.
    pub fn from_config(config: &TaskEngineConfig) -> Result<Self> {
        let plans = match &config.plans_path {
            Some(path) => PlanRegistry::with_file(path)?,
            None => PlanRegistry::builtin(),
        };
        let client = HttpPluginServiceClient::new(
            config.plugin_service.url.clone(),
            config.plugin_service.request_timeout,
        )?;
        let database = scan_database::from_config(&config.database)?;
        Ok(Self::new(
            config.coordinator.clone(),
            plans,
            Arc::new(client),
            database,
            ArtifactStore::new(config.artifacts.root.clone()),
        ))
    }

    pub fn get_plans(&self) -> Vec<PlanDescription> {
        self.inner.plans.descriptions()
    }

    pub fn get_plan(&self, name: &str) -> Result<Plan> {
        self.inner
            .plans
            .get(name)
            .cloned()
            .ok_or_else(|| TaskEngineError::NoSuchPlan(name.to_string()))
    }

    /// Create a scan and one plugin session per plan step, in plan order.
    ///
    /// Creation calls against the Plugin Service are serialized across all
    /// callers. The coordinator starts ticking on the first scan.
    pub async fn create_session(
        &self,
        plan_name: &str,
        configuration: Configuration,
    ) -> Result<ScanSummary> {
        let plan = self.get_plan(plan_name)?;
        let sessions = {
            let _permit = self
                .inner
                .create_gate
                .acquire()
                .await
                .map_err(|_| TaskEngineError::ShuttingDown)?;
            let mut sessions = Vec::with_capacity(plan.workflow.len());
            for step in &plan.workflow {
                let merged = step.merged_configuration(&configuration);
                let remote = self
                    .inner
                    .plugin_service
                    .create_session(&step.plugin_name, &merged)
                    .await
                    .inspect_err(|err| {
                        warn!(plan = %plan.name, plugin = %step.plugin_name, error = %err, "failed to create plugin session");
                    })?;
                sessions.push(PluginSessionRef::from_summary(&remote));
            }
            sessions
        };

        let summary = ScanSummary {
            id: ScanId::new(),
            state: ScanState::Created,
            plan,
            configuration,
            sessions,
            created: Utc::now(),
            started: None,
            finished: None,
        };
        info!(scan_id = %summary.id, plan = %summary.plan.name, sessions = summary.sessions.len(), "scan created");

        self.inner.active.write().insert(
            summary.id,
            Arc::new(tokio::sync::Mutex::new(summary.clone())),
        );
        self.ensure_ticking();
        Ok(summary)
    }

    /// CREATED → STARTED.
    pub async fn start(&self, id: ScanId) -> Result<()> {
        let Some(scan) = self.active(id) else {
            return Err(self.inactive_transition(id, "start").await);
        };
        let mut scan = scan.lock().await;
        if scan.state != ScanState::Created {
            return Err(TaskEngineError::InvalidStateTransition {
                state: scan.state,
                command: "start",
            });
        }
        scan.state = ScanState::Started;
        scan.started = Some(Utc::now());
        info!(scan_id = %id, "scan started");
        Ok(())
    }

    /// STARTED → STOPPING; a scan already stopping or stopped is left alone.
    pub async fn stop(&self, id: ScanId) -> Result<()> {
        let Some(scan) = self.active(id) else {
            return match self.inner.database.load(id).await? {
                Some(stored) if stored.state == ScanState::Stopped => Ok(()),
                Some(stored) => Err(TaskEngineError::InvalidStateTransition {
                    state: stored.state,
                    command: "stop",
                }),
                None => Err(TaskEngineError::NoSuchScan(id)),
            };
        };
        let mut scan = scan.lock().await;
        match scan.state {
            ScanState::Started => {
                scan.state = ScanState::Stopping;
                info!(scan_id = %id, "scan stopping");
                Ok(())
            }
            ScanState::Stopping | ScanState::Stopped => Ok(()),
            state => Err(TaskEngineError::InvalidStateTransition {
                state,
                command: "stop",
            }),
        }
    }

    /// Active scans first, then storage.
    pub async fn get_session(&self, id: ScanId) -> Result<ScanSummary> {
        if let Some(scan) = self.active(id) {
            return Ok(scan.lock().await.clone());
        }
        self.inner
            .database
            .load(id)
            .await?
            .ok_or(TaskEngineError::NoSuchScan(id))
    }

    /// Issues newer than `token` and the token to poll with next, absent once
    /// every plugin session has been collected.
    pub async fn results(
        &self,
        id: ScanId,
        token: Option<&str>,
    ) -> Result<(ScanResults, Option<ResultsCursor>)> {
        let since = match token {
            Some(raw) if !raw.is_empty() => {
                ResultsCursor::decode(raw).map_err(|_| TaskEngineError::InvalidToken)?
            }
            _ => ResultsCursor::beginning(),
        };
        let summary = self.get_session(id).await?;
        Ok(summary.results_since(&since))
    }

    /// Remove a finished or stopped scan from storage.
    pub async fn delete_session(&self, id: ScanId) -> Result<()> {
        if let Some(scan) = self.active(id) {
            let state = scan.lock().await.state;
            return Err(TaskEngineError::InvalidStateTransition {
                state,
                command: "delete",
            });
        }
        if self.inner.database.delete(id).await? {
            info!(scan_id = %id, "scan deleted");
            Ok(())
        } else {
            Err(TaskEngineError::NoSuchScan(id))
        }
    }

    /// One coordinator pass over every active scan.
    pub async fn tick(&self) {
        let scans: Vec<(ScanId, ActiveScan)> = self
            .inner
            .active
            .read()
            .iter()
            .map(|(id, scan)| (*id, Arc::clone(scan)))
            .collect();
        if scans.is_empty() {
            return;
        }

        let passes = scans.iter().map(|(id, scan)| {
            let inner = &self.inner;
            async move {
                let mut scan = scan.lock().await;
                (*id, inner.advance(&mut scan).await)
            }
        });
        let retired: Vec<ScanId> = futures::future::join_all(passes)
            .await
            .into_iter()
            .filter_map(|(id, persisted)| persisted.then_some(id))
            .collect();

        if !retired.is_empty() {
            let mut active = self.inner.active.write();
            for id in retired {
                active.remove(&id);
                debug!(scan_id = %id, "scan retired from active table");
            }
        }
    }

    pub fn active_scans(&self) -> usize {
        self.inner.active.read().len()
    }

    /// Stop the coordinator. Scans still active stay in memory only.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.create_gate.close();
        let handle = self.inner.ticker.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(30), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "coordinator task failed"),
                Err(_) => warn!("coordinator did not stop in time"),
            }
        }
        let remaining = self.active_scans();
        if remaining > 0 {
            warn!(remaining, "shutting down with unfinished scans");
        }
    }

    fn active(&self, id: ScanId) -> Option<ActiveScan> {
        self.inner.active.read().get(&id).cloned()
    }

    async fn inactive_transition(&self, id: ScanId, command: &'static str) -> TaskEngineError {
        match self.inner.database.load(id).await {
            Ok(Some(stored)) => TaskEngineError::InvalidStateTransition {
                state: stored.state,
                command,
            },
            Ok(None) => TaskEngineError::NoSuchScan(id),
            Err(err) => err.into(),
        }
    }

    fn ensure_ticking(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut ticker = self.inner.ticker.lock();
        if ticker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let interval = self.inner.coordinator.tick_interval;
        info!(?interval, "starting scan coordinator");
        *ticker = Some(tokio::spawn(coordinate(
            Arc::downgrade(&self.inner),
            interval,
            self.inner.shutdown.clone(),
        )));
    }
}

async fn coordinate(engine: Weak<Inner>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("scan coordinator shutting down");
                break;
            }
            _ = ticker.tick() => {
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                TaskEngine { inner }.tick().await;
            }
        }
    }
}
