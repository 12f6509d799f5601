//! Runner process spawning and monitoring.

use std::process::{ExitStatus, Stdio};

use picket_config::RunnerConfig;
use picket_model::SessionId;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ENV_SERVICE_API, ENV_SESSION_ID};

/// How a runner process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessExit {
    Code(i32),
    /// Killed by a signal (number when known).
    Signal(Option<i32>),
    /// The process never started.
    SpawnFailed,
}

impl ProcessExit {
    pub fn code(self) -> Option<i32> {
        match self {
            ProcessExit::Code(code) => Some(code),
            _ => None,
        }
    }

    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ProcessExit::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ProcessExit::Signal(status.signal())
        }
        #[cfg(not(unix))]
        {
            ProcessExit::Signal(None)
        }
    }
}

#[derive(Debug)]
pub(crate) enum ProcessControl {
    Kill,
}

/// Supervisor-side handle on a live runner process.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    pub pid: Option<u32>,
    pub control: mpsc::UnboundedSender<ProcessControl>,
}

impl ProcessHandle {
    pub fn kill(&self) {
        let _ = self.control.send(ProcessControl::Kill);
    }

    /// Ask the process to end cooperatively. Platforms without signals get a
    /// kill instead.
    pub fn request_stop(&self, session_id: SessionId) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                Ok(()) => return,
                Err(err) => {
                    warn!(%session_id, pid, error = %err, "failed to signal plugin process, killing");
                }
            }
        }
        self.kill();
    }
}

/// Launch `program args... --plugin <name> [--debug]` with only the session
/// id, service URL and `PATH` in its environment.
pub(crate) fn spawn_runner(
    runner: &RunnerConfig,
    session_id: SessionId,
    plugin_name: &str,
) -> std::io::Result<Child> {
    let mut cmd = Command::new(&runner.program);
    cmd.args(&runner.args);
    cmd.arg("--plugin").arg(plugin_name);
    if runner.debug {
        cmd.arg("--debug");
    }

    cmd.env_clear();
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }
    cmd.env(ENV_SESSION_ID, session_id.to_string());
    cmd.env(ENV_SERVICE_API, &runner.api_url);

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    cmd.spawn()
}

/// Drive a runner process to completion: forward its output as it arrives,
/// honour kill requests, and report how it ended.
pub(crate) async fn monitor(
    mut child: Child,
    session_id: SessionId,
    mut control: mpsc::UnboundedReceiver<ProcessControl>,
) -> ProcessExit {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, session_id, "stdout"));
    }
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, session_id, "stderr"));
    }

    loop {
        tokio::select! {
            status = child.wait() => {
                return match status {
                    Ok(status) => ProcessExit::from_status(status),
                    Err(err) => {
                        warn!(%session_id, error = %err, "failed to wait for plugin process");
                        ProcessExit::Signal(None)
                    }
                };
            }
            Some(ProcessControl::Kill) = control.recv() => {
                debug!(%session_id, "killing plugin process");
                if let Err(err) = child.start_kill() {
                    warn!(%session_id, error = %err, "failed to kill plugin process");
                }
            }
        }
    }
}

async fn forward_lines<R>(reader: R, session_id: SessionId, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "picket::plugin_output", %session_id, stream, "{line}");
    }
}
