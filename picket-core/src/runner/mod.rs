//! Process side of the plugin contract: fetch configuration, drive one
//! plugin in its execution style, and forward its reports in order.

pub mod callbacks;

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use picket_contracts::{
    EXIT_CODE_ABORTED, EXIT_CODE_FAILED, EXIT_CODE_SUCCESS, ExternalProcessPlugin,
    IncrementalPlugin, PluginCallbacks, PluginCatalog, PluginContext, PluginError,
    PluginExecution, Report, Reporter, TickOutcome,
};
use picket_model::{ReportedError, SessionId};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use callbacks::HttpCallbacks;

use crate::plugin_service::{ENV_SERVICE_API, ENV_SESSION_ID};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("malformed session id `{0}`")]
    InvalidSessionId(String),

    #[error("unknown plugin `{0}`")]
    UnknownPlugin(String),

    #[error("plugin service request failed")]
    Http(#[from] reqwest::Error),

    #[error("plugin service rejected request: {0}")]
    Rejected(String),

    #[error("cannot create work directory")]
    WorkDir(#[source] std::io::Error),
}

/// Where a runner process finds its session.
#[derive(Debug, Clone)]
pub struct RunnerEnvironment {
    pub session_id: SessionId,
    pub api_url: String,
}

impl RunnerEnvironment {
    pub fn from_env() -> Result<Self, RunnerError> {
        let raw_id = std::env::var(ENV_SESSION_ID)
            .map_err(|_| RunnerError::MissingEnv(ENV_SESSION_ID))?;
        let session_id = SessionId::parse(&raw_id)
            .map_err(|_| RunnerError::InvalidSessionId(raw_id.clone()))?;
        let api_url = std::env::var(ENV_SERVICE_API)
            .map_err(|_| RunnerError::MissingEnv(ENV_SERVICE_API))?;
        Ok(Self {
            session_id,
            api_url: api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Per-session working directory for artifacts.
    pub fn work_dir(&self) -> PathBuf {
        std::env::temp_dir()
            .join("picket")
            .join(self.session_id.to_string())
    }
}

/// Body of a runner process: resolve the session from the environment,
/// fetch its configuration and run `plugin_name` from `catalog` to
/// completion. Anything that prevents the plugin from starting exits with
/// [`EXIT_CODE_FAILED`].
pub async fn run_from_env(
    plugin_name: &str,
    catalog: &PluginCatalog,
    shutdown: CancellationToken,
) -> i32 {
    match prepare(plugin_name, catalog).await {
        Ok((execution, ctx, callbacks)) => run_plugin(execution, ctx, callbacks, shutdown).await,
        Err(err) => {
            error!(plugin = plugin_name, error = %err, "plugin runner could not start");
            EXIT_CODE_FAILED
        }
    }
}

async fn prepare(
    plugin_name: &str,
    catalog: &PluginCatalog,
) -> Result<(PluginExecution, PluginContext, Arc<dyn PluginCallbacks>), RunnerError> {
    let env = RunnerEnvironment::from_env()?;
    let execution = catalog
        .instantiate(plugin_name)
        .ok_or_else(|| RunnerError::UnknownPlugin(plugin_name.to_string()))?;
    let callbacks = HttpCallbacks::new(env.api_url.clone(), env.session_id)?;
    let configuration = callbacks.fetch_configuration().await?;
    let work_dir = env.work_dir();
    tokio::fs::create_dir_all(&work_dir)
        .await
        .map_err(RunnerError::WorkDir)?;
    debug!(session_id = %env.session_id, work_dir = %work_dir.display(), "runner prepared");
    let ctx = PluginContext {
        session_id: env.session_id,
        configuration,
        work_dir,
    };
    Ok((execution, ctx, Arc::new(callbacks)))
}

const CANCEL_FLUSH: Duration = Duration::from_secs(2);

enum BodyOutcome {
    Completed(Result<(), PluginError>),
    Cancelled,
}

/// Run one plugin to completion and return the process exit code.
///
/// Reports reach `callbacks` in the order the plugin produced them. A
/// successful body is followed by a finish report; an error is reported and
/// mapped to its exit code; cancellation (SIGTERM) ends with
/// [`EXIT_CODE_ABORTED`]. An explicit `report_abort` wins over all of these.
pub async fn run_plugin(
    execution: PluginExecution,
    ctx: PluginContext,
    callbacks: Arc<dyn PluginCallbacks>,
    shutdown: CancellationToken,
) -> i32 {
    let (reporter, rx) = Reporter::channel();
    let forwarder = tokio::spawn(forward_reports(rx, Arc::clone(&callbacks)));

    info!(session_id = %ctx.session_id, style = execution.style(), "running plugin");
    let outcome = match execution {
        PluginExecution::Blocking(mut plugin) => {
            let worker_reporter = reporter.clone();
            let worker_ctx = ctx.clone();
            let body = tokio::task::spawn_blocking(move || {
                plugin.run(&worker_ctx, &worker_reporter)
            });
            tokio::select! {
                _ = shutdown.cancelled() => BodyOutcome::Cancelled,
                joined = body => BodyOutcome::Completed(joined.unwrap_or_else(|err| {
                    Err(PluginError::Failed(format!("plugin panicked: {err}")))
                })),
            }
        }
        PluginExecution::ExternalProcess(plugin) => {
            run_external(plugin, &ctx, &reporter, &shutdown).await
        }
        PluginExecution::Incremental(plugin) => {
            run_incremental(plugin, &ctx, &reporter, &shutdown).await
        }
    };

    if let BodyOutcome::Completed(Err(err)) = &outcome {
        error!(session_id = %ctx.session_id, error = %err, "plugin failed");
        reporter.report_errors(vec![ReportedError::new(err.to_string())]);
    }
    drop(reporter);

    // A cancelled blocking body may still hold a reporter clone on its
    // worker thread, so the forwarder only gets a bounded flush.
    let mut forwarder = forwarder;
    let flushed = if matches!(outcome, BodyOutcome::Cancelled) {
        match tokio::time::timeout(CANCEL_FLUSH, &mut forwarder).await {
            Ok(joined) => joined,
            Err(_) => {
                forwarder.abort();
                Ok(None)
            }
        }
    } else {
        forwarder.await
    };
    let abort_code = match flushed {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "report forwarder panicked");
            None
        }
    };
    if let Some(code) = abort_code {
        info!(session_id = %ctx.session_id, code, "plugin aborted");
        return code;
    }

    match outcome {
        BodyOutcome::Completed(Ok(())) => match callbacks.report_finish().await {
            Ok(()) => EXIT_CODE_SUCCESS,
            Err(err) => {
                error!(error = %err, "failed to report finish");
                EXIT_CODE_FAILED
            }
        },
        BodyOutcome::Completed(Err(err)) => err.exit_code(),
        BodyOutcome::Cancelled => {
            info!(session_id = %ctx.session_id, "plugin stopped on request");
            EXIT_CODE_ABORTED
        }
    }
}

/// Deliver reports in order. Returns the exit code of the first abort
/// request, if any; reports after it are dropped.
async fn forward_reports(
    mut rx: mpsc::UnboundedReceiver<Report>,
    callbacks: Arc<dyn PluginCallbacks>,
) -> Option<i32> {
    let mut abort = None;
    while let Some(report) = rx.recv().await {
        if abort.is_some() {
            continue;
        }
        if let Report::Abort(code) = report {
            abort = Some(code);
            continue;
        }
        if let Err(err) = callbacks.dispatch(report).await {
            warn!(error = %err, "failed to deliver report");
        }
    }
    abort
}

async fn run_external(
    mut plugin: Box<dyn ExternalProcessPlugin>,
    ctx: &PluginContext,
    reporter: &Reporter,
    shutdown: &CancellationToken,
) -> BodyOutcome {
    let command = match plugin.command(ctx) {
        Ok(command) => command,
        Err(err) => return BodyOutcome::Completed(Err(err)),
    };
    debug!(program = %command.program, args = ?command.args, "spawning external tool");

    let mut child = match Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(err) => {
            return BodyOutcome::Completed(Err(PluginError::Failed(format!(
                "cannot run {}: {err}",
                command.program
            ))));
        }
    };

    let mut stdout = child.stdout.take().map(|out| BufReader::new(out).lines());
    let mut stderr = child.stderr.take().map(|err| BufReader::new(err).lines());

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return BodyOutcome::Cancelled;
            }
            line = next_line(&mut stdout), if stdout.is_some() => match line {
                Some(line) => plugin.on_stdout(&line, reporter),
                None => stdout = None,
            },
            line = next_line(&mut stderr), if stderr.is_some() => match line {
                Some(line) => plugin.on_stderr(&line, reporter),
                None => stderr = None,
            },
            status = child.wait(), if stdout.is_none() && stderr.is_none() => {
                let code = match status {
                    Ok(status) => status.code(),
                    Err(err) => {
                        warn!(error = %err, "failed to wait for external tool");
                        None
                    }
                };
                return BodyOutcome::Completed(plugin.on_exit(code, reporter));
            }
        }
    }
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    match lines {
        Some(lines) => lines.next_line().await.ok().flatten(),
        None => None,
    }
}

async fn run_incremental(
    mut plugin: Box<dyn IncrementalPlugin>,
    ctx: &PluginContext,
    reporter: &Reporter,
    shutdown: &CancellationToken,
) -> BodyOutcome {
    let mut interval = tokio::time::interval(plugin.interval(ctx).max(Duration::from_millis(1)));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return BodyOutcome::Cancelled,
            _ = interval.tick() => match plugin.tick(ctx, reporter).await {
                Ok(TickOutcome::Continue) => {}
                Ok(TickOutcome::Finished) => return BodyOutcome::Completed(Ok(())),
                Err(err) => return BodyOutcome::Completed(Err(err)),
            },
        }
    }
}
