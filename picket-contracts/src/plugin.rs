use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use picket_model::{Configuration, SessionId};
use thiserror::Error;

use crate::exit_codes::{EXIT_CODE_ABORTED, EXIT_CODE_FAILED};
use crate::report::Reporter;

/// Errors a plugin body can end with.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The plugin decided the scan cannot proceed; maps to ABORTED.
    #[error("aborted: {0}")]
    Aborted(String),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub fn exit_code(&self) -> i32 {
        match self {
            PluginError::Aborted(_) => EXIT_CODE_ABORTED,
            _ => EXIT_CODE_FAILED,
        }
    }
}

/// Everything a plugin instance gets to know about its session.
#[derive(Debug, Clone)]
pub struct PluginContext {
    pub session_id: SessionId,
    pub configuration: Configuration,
    /// Directory artifacts produced by this session are written to.
    pub work_dir: PathBuf,
}

impl PluginContext {
    pub fn string(&self, key: &str) -> Option<&str> {
        self.configuration.get(key).and_then(|value| value.as_str())
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.configuration.get(key).and_then(|value| value.as_u64())
    }

    pub fn require_string(&self, key: &str) -> Result<&str, PluginError> {
        self.string(key)
            .ok_or_else(|| PluginError::Configuration(format!("missing `{key}`")))
    }
}

/// Synchronous plugin body, run on a worker thread.
///
/// Returning `Ok` finishes the session; returning `Err` fails (or aborts)
/// it.
pub trait BlockingPlugin: Send {
    fn run(&mut self, ctx: &PluginContext, reporter: &Reporter) -> Result<(), PluginError>;
}

/// Program and arguments for an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Plugin that wraps an external tool and consumes its output line by line
/// while it runs.
pub trait ExternalProcessPlugin: Send {
    fn command(&mut self, ctx: &PluginContext) -> Result<ExternalCommand, PluginError>;

    fn on_stdout(&mut self, line: &str, reporter: &Reporter);

    fn on_stderr(&mut self, line: &str, reporter: &Reporter) {
        let _ = (line, reporter);
    }

    /// Called once the tool exits. `None` means it was killed by a signal.
    fn on_exit(&mut self, status: Option<i32>, reporter: &Reporter) -> Result<(), PluginError> {
        let _ = reporter;
        match status {
            Some(0) => Ok(()),
            Some(code) => Err(PluginError::Failed(format!("tool exited with status {code}"))),
            None => Err(PluginError::Failed("tool was killed".into())),
        }
    }
}

/// Result of one scheduled step of an incremental plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    Finished,
}

/// Plugin that drives its own periodic callback, emitting results as it
/// goes without blocking.
#[async_trait]
pub trait IncrementalPlugin: Send {
    fn interval(&self, ctx: &PluginContext) -> Duration;

    async fn tick(
        &mut self,
        ctx: &PluginContext,
        reporter: &Reporter,
    ) -> Result<TickOutcome, PluginError>;
}

/// A plugin instance tagged with its execution style.
pub enum PluginExecution {
    Blocking(Box<dyn BlockingPlugin>),
    ExternalProcess(Box<dyn ExternalProcessPlugin>),
    Incremental(Box<dyn IncrementalPlugin>),
}

impl PluginExecution {
    pub fn style(&self) -> &'static str {
        match self {
            PluginExecution::Blocking(_) => "blocking",
            PluginExecution::ExternalProcess(_) => "external-process",
            PluginExecution::Incremental(_) => "incremental",
        }
    }
}

impl std::fmt::Debug for PluginExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PluginExecution").field(&self.style()).finish()
    }
}
