//! One coordinator pass over a single scan.
//!
//! Each plugin session ref gets at most one refresh and one action per
//! pass, in workflow order:
//!
//! 1. refresh the ref from the Plugin Service unless it is done;
//! 2. on a stopping scan, STOP a running ref (TERMINATE once the grace period
//!    has passed) and retire refs that never started;
//! 3. START the first ref still in CREATED, then end the pass;
//! 4. collect results of a running ref, then end the pass, so a step only
//!    starts once every step before it is done;
//! 5. collect final results and artifacts of terminal refs and mark them done.
//!
//! When every ref is done the scan becomes FINISHED or STOPPED and is
//! persisted; it leaves the active table only once that store succeeds.

use chrono::{DateTime, TimeDelta, Utc};
use picket_model::{
    ErrorCode, PluginSessionRef, PluginSessionState, ReportedError, ScanState, ScanSummary,
    SessionCommand,
};
use tracing::{debug, error, info, warn};

use super::client::ClientError;
use super::engine::Inner;

enum Step {
    Next,
    EndPass,
}

impl Inner {
    /// Advance `scan` by one pass. Returns true once the scan is terminal
    /// and stored.
    pub(super) async fn advance(&self, scan: &mut ScanSummary) -> bool {
        if scan.state.is_active() {
            self.advance_sessions(scan).await;
            if scan.all_done() {
                scan.state = match scan.state {
                    ScanState::Stopping => ScanState::Stopped,
                    _ => ScanState::Finished,
                };
                scan.finished = Some(Utc::now());
                info!(scan_id = %scan.id, state = %scan.state, "scan complete");
            }
        }

        if !scan.state.is_terminal() {
            return false;
        }
        match self.database.store(scan).await {
            Ok(()) => true,
            Err(err) => {
                error!(scan_id = %scan.id, error = %err, "failed to persist scan; retrying next tick");
                false
            }
        }
    }

    async fn advance_sessions(&self, scan: &mut ScanSummary) {
        let stopping = scan.state == ScanState::Stopping;
        let now = Utc::now();
        for session in scan.sessions.iter_mut().filter(|session| !session.done) {
            let step = match self.advance_session(session, stopping, now).await {
                Ok(step) => step,
                Err(err) => {
                    warn!(scan_id = %scan.id, session_id = %session.id, error = %err, "plugin service call failed; skipping scan this tick");
                    Step::EndPass
                }
            };
            if matches!(step, Step::EndPass) {
                break;
            }
        }
    }

    async fn advance_session(
        &self,
        session: &mut PluginSessionRef,
        stopping: bool,
        now: DateTime<Utc>,
    ) -> Result<Step, ClientError> {
        match self.plugin_service.get_session(session.id).await {
            Ok(remote) => session.apply_summary(&remote),
            Err(ClientError::Rejected(ErrorCode::NoSuchSession)) => {
                warn!(session_id = %session.id, "plugin session is gone; giving up on it");
                session
                    .errors
                    .push(ReportedError::new("plugin session no longer exists"));
                session.done = true;
                return Ok(Step::Next);
            }
            Err(err) => return Err(err),
        }

        if stopping {
            match session.state {
                PluginSessionState::Created => {
                    debug!(session_id = %session.id, "never started; retiring");
                    session.done = true;
                    return Ok(Step::Next);
                }
                PluginSessionState::Started => {
                    self.escalate_stop(session, now).await?;
                    return Ok(Step::Next);
                }
                _ => {}
            }
        }

        match session.state {
            PluginSessionState::Created => {
                self.plugin_service
                    .change_state(session.id, SessionCommand::Start)
                    .await?;
                debug!(session_id = %session.id, plugin = %session.plugin.name, "plugin session started");
                Ok(Step::EndPass)
            }
            PluginSessionState::Started => {
                let issues = self.plugin_service.results(session.id).await?;
                session.apply_results(issues);
                Ok(Step::EndPass)
            }
            _ => {
                let issues = self.plugin_service.results(session.id).await?;
                session.apply_results(issues);
                if session.artifacts {
                    self.collect_artifacts(session).await;
                }
                session.done = true;
                debug!(session_id = %session.id, state = %session.state, issues = session.issues.len(), "plugin session collected");
                Ok(Step::Next)
            }
        }
    }

    async fn escalate_stop(
        &self,
        session: &mut PluginSessionRef,
        now: DateTime<Utc>,
    ) -> Result<(), ClientError> {
        let Some(requested) = session.stop_requested_at else {
            self.plugin_service
                .change_state(session.id, SessionCommand::Stop)
                .await?;
            session.stop_requested_at = Some(now);
            return Ok(());
        };
        let grace = TimeDelta::from_std(self.coordinator.stop_grace).unwrap_or(TimeDelta::MAX);
        if !session.terminate_sent && now - requested >= grace {
            warn!(session_id = %session.id, "plugin session ignored STOP; terminating");
            self.plugin_service
                .change_state(session.id, SessionCommand::Terminate)
                .await?;
            session.terminate_sent = true;
        }
        Ok(())
    }

    async fn collect_artifacts(&self, session: &PluginSessionRef) {
        for file in &session.files {
            let bytes = match self.plugin_service.file(session.id, file.id).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(session_id = %session.id, file = %file.name, error = %err, "failed to fetch artifact");
                    continue;
                }
            };
            match self.artifacts.save(session.id, file, bytes).await {
                Ok(path) => debug!(session_id = %session.id, path = %path.display(), "artifact saved"),
                Err(err) => {
                    warn!(session_id = %session.id, file = %file.name, error = %err, "failed to save artifact")
                }
            }
        }
    }
}
