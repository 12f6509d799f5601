//! Validated runtime configuration for both services.

pub mod sources;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PLUGIN_SERVICE_PORT: u16 = 8181;
pub const DEFAULT_TASK_ENGINE_PORT: u16 = 8383;
pub const DEFAULT_RUNNER_PROGRAM: &str = "picket-plugin-runner";
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RUNTIME: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_SCAN_STOP_GRACE: Duration = Duration::from_secs(30);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How the Plugin Service launches plugin processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerConfig {
    pub program: String,
    /// Arguments placed before `--plugin <name>`.
    pub args: Vec<String>,
    /// Base URL handed to plugin processes for configuration and reports.
    pub api_url: String,
    pub debug: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_RUNNER_PROGRAM.to_string(),
            args: Vec::new(),
            api_url: format!("http://127.0.0.1:{DEFAULT_PLUGIN_SERVICE_PORT}"),
            debug: false,
        }
    }
}

/// Limits applied to running plugin processes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisionConfig {
    /// Time between a cooperative stop signal and a forced kill.
    pub stop_grace: Duration,
    /// Watchdog limit for a single plugin session; `None` disables it.
    pub max_runtime: Option<Duration>,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            max_runtime: Some(DEFAULT_MAX_RUNTIME),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginServiceConfig {
    pub server: ServerConfig,
    pub runner: RunnerConfig,
    pub supervision: SupervisionConfig,
}

impl Default for PluginServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_PLUGIN_SERVICE_PORT,
            },
            runner: RunnerConfig::default(),
            supervision: SupervisionConfig::default(),
        }
    }
}

/// Where the Task Engine reaches the Plugin Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginServiceClientConfig {
    pub url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub tick_interval: Duration,
    /// Time a plugin session may take to honour STOP before TERMINATE is sent.
    pub stop_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            stop_grace: DEFAULT_SCAN_STOP_GRACE,
        }
    }
}

/// Scan database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    #[default]
    Memory,
    Files,
}

impl FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "files" | "file" => Ok(Self::Files),
            other => Err(format!("unknown scan database kind `{other}`")),
        }
    }
}

impl fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseKind::Memory => f.write_str("memory"),
            DatabaseKind::Files => f.write_str("files"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatabaseConfig {
    pub kind: DatabaseKind,
    /// Directory for the `files` backend.
    pub location: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactsConfig {
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./artifacts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEngineConfig {
    pub server: ServerConfig,
    pub plugin_service: PluginServiceClientConfig,
    pub coordinator: CoordinatorConfig,
    pub database: DatabaseConfig,
    pub artifacts: ArtifactsConfig,
    /// Optional file with additional plan definitions.
    pub plans_path: Option<PathBuf>,
}

impl Default for TaskEngineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: DEFAULT_TASK_ENGINE_PORT,
            },
            plugin_service: PluginServiceClientConfig {
                url: format!("http://127.0.0.1:{DEFAULT_PLUGIN_SERVICE_PORT}"),
                request_timeout: DEFAULT_REQUEST_TIMEOUT,
            },
            coordinator: CoordinatorConfig::default(),
            database: DatabaseConfig::default(),
            artifacts: ArtifactsConfig::default(),
            plans_path: None,
        }
    }
}
