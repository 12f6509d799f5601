use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::loader::error::ConfigLoadError;
use crate::models::DatabaseKind;
use crate::util::{non_empty_var, parse_bool_var, parse_csv_var, parse_duration};

/// Raw configuration as defined in a TOML (or JSON) file. One file may carry
/// both services' sections.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub plugin_service: FilePluginServiceConfig,
    #[serde(default)]
    pub task_engine: FileTaskEngineConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePluginServiceConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub runner: FileRunnerConfig,
    #[serde(default)]
    pub supervision: FileSupervisionConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileRunnerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileSupervisionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace_ms: Option<u64>,
    /// `0` disables the watchdog.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_runtime_secs: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileTaskEngineConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub plugin_service: FilePluginServiceClientConfig,
    #[serde(default)]
    pub coordinator: FileCoordinatorConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub artifacts: FileArtifactsConfig,
    #[serde(default)]
    pub plans: FilePlansConfig,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePluginServiceClientConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCoordinatorConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_grace_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<DatabaseKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileArtifactsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePlansConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,

    pub plugin_service_host: Option<String>,
    pub plugin_service_port: Option<u16>,
    pub runner_program: Option<String>,
    pub runner_args: Option<Vec<String>>,
    pub runner_api_url: Option<String>,
    pub runner_debug: Option<bool>,
    pub stop_grace: Option<Duration>,
    pub max_runtime: Option<Duration>,

    pub task_engine_host: Option<String>,
    pub task_engine_port: Option<u16>,
    pub plugin_service_url: Option<String>,
    pub plugin_service_timeout: Option<Duration>,
    pub tick_interval: Option<Duration>,
    pub scan_stop_grace: Option<Duration>,
    pub database_kind: Option<DatabaseKind>,
    pub database_location: Option<PathBuf>,
    pub artifacts_root: Option<PathBuf>,
    pub plans_path: Option<PathBuf>,
}

impl EnvConfig {
    pub fn gather() -> Result<Self, ConfigLoadError> {
        Ok(Self {
            config_path: non_empty_var("PICKET_CONFIG").map(PathBuf::from),

            plugin_service_host: non_empty_var("PICKET_PLUGIN_SERVICE_HOST"),
            plugin_service_port: port_var("PICKET_PLUGIN_SERVICE_PORT")?,
            runner_program: non_empty_var("PICKET_RUNNER_PROGRAM"),
            runner_args: parse_csv_var("PICKET_RUNNER_ARGS"),
            runner_api_url: non_empty_var("PICKET_RUNNER_API_URL"),
            runner_debug: parse_bool_var("PICKET_RUNNER_DEBUG"),
            stop_grace: duration_var("PICKET_STOP_GRACE")?,
            max_runtime: duration_var("PICKET_MAX_RUNTIME")?,

            task_engine_host: non_empty_var("PICKET_TASK_ENGINE_HOST"),
            task_engine_port: port_var("PICKET_TASK_ENGINE_PORT")?,
            plugin_service_url: non_empty_var("PICKET_PLUGIN_SERVICE_URL"),
            plugin_service_timeout: duration_var("PICKET_PLUGIN_SERVICE_TIMEOUT")?,
            tick_interval: duration_var("PICKET_TICK_INTERVAL")?,
            scan_stop_grace: duration_var("PICKET_SCAN_STOP_GRACE")?,
            database_kind: non_empty_var("PICKET_SCAN_DATABASE")
                .map(|raw| {
                    raw.parse().map_err(|_| ConfigLoadError::InvalidEnv {
                        name: "PICKET_SCAN_DATABASE",
                        value: raw.clone(),
                    })
                })
                .transpose()?,
            database_location: non_empty_var("PICKET_SCAN_DATABASE_LOCATION")
                .map(PathBuf::from),
            artifacts_root: non_empty_var("PICKET_ARTIFACTS_ROOT").map(PathBuf::from),
            plans_path: non_empty_var("PICKET_PLANS_PATH").map(PathBuf::from),
        })
    }
}

fn port_var(name: &'static str) -> Result<Option<u16>, ConfigLoadError> {
    non_empty_var(name)
        .map(|raw| {
            raw.parse()
                .map_err(|_| ConfigLoadError::InvalidEnv { name, value: raw.clone() })
        })
        .transpose()
}

fn duration_var(name: &'static str) -> Result<Option<Duration>, ConfigLoadError> {
    non_empty_var(name)
        .map(|raw| {
            parse_duration(&raw)
                .ok_or_else(|| ConfigLoadError::InvalidEnv { name, value: raw.clone() })
        })
        .transpose()
}
