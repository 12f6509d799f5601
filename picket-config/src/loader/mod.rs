pub mod error;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::models::sources::{EnvConfig, FileConfig, FileServerConfig};
use crate::models::{
    ArtifactsConfig, CoordinatorConfig, DatabaseConfig, DatabaseKind,
    PluginServiceClientConfig, PluginServiceConfig, RunnerConfig, ServerConfig,
    SupervisionConfig, TaskEngineConfig,
};
use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: &[&str] = &["picket.toml", "config/picket.toml"];

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

/// A loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigLoad<T> {
    pub config: T,
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    pub fn load_plugin_service(
        &self,
    ) -> Result<ConfigLoad<PluginServiceConfig>, ConfigLoadError> {
        let (file, env, config_path, env_file_loaded) = self.load_sources()?;
        Ok(ConfigLoad {
            config: compose_plugin_service(&file, &env)?,
            config_path,
            env_file_loaded,
        })
    }

    pub fn load_task_engine(
        &self,
    ) -> Result<ConfigLoad<TaskEngineConfig>, ConfigLoadError> {
        let (file, env, config_path, env_file_loaded) = self.load_sources()?;
        Ok(ConfigLoad {
            config: compose_task_engine(&file, &env)?,
            config_path,
            env_file_loaded,
        })
    }

    fn load_sources(
        &self,
    ) -> Result<(FileConfig, EnvConfig, Option<PathBuf>, bool), ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                dotenvy::Error::Io(_) => Ok(false),
                _ => Err(err),
            })?,
        };

        let env = EnvConfig::gather()?;
        let (file, path) = self.load_file_config(&env)?;
        Ok((file.unwrap_or_default(), env, path, env_file_loaded))
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let explicit = self
            .options
            .config_path
            .clone()
            .or_else(|| env.config_path.clone());

        let path = match explicit {
            Some(path) if !path.exists() => {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            Some(path) => path,
            None => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .map(PathBuf::from)
                .find(|candidate| candidate.exists())
            {
                Some(path) => path,
                None => return Ok((None, None)),
            },
        };

        let config = read_file_config(&path)?;
        tracing::debug!(path = %path.display(), "loaded configuration file");
        Ok((Some(config), Some(path)))
    }
}

/// Parse a config file. `.json` files are read as JSON, everything else as
/// TOML.
pub fn read_file_config(path: &Path) -> Result<FileConfig, ConfigLoadError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_file_config(path, &contents)
}

fn parse_file_config(path: &Path, contents: &str) -> Result<FileConfig, ConfigLoadError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(contents).map_err(|source| ConfigLoadError::ParseJson {
            path: path.to_path_buf(),
            source,
        })
    } else {
        toml::from_str(contents).map_err(|source| ConfigLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn compose_server(
    file: &FileServerConfig,
    env_host: &Option<String>,
    env_port: Option<u16>,
    defaults: ServerConfig,
) -> ServerConfig {
    ServerConfig {
        host: env_host.clone().or(file.host.clone()).unwrap_or(defaults.host),
        port: env_port.or(file.port).unwrap_or(defaults.port),
    }
}

pub(crate) fn compose_plugin_service(
    file: &FileConfig,
    env: &EnvConfig,
) -> Result<PluginServiceConfig, ConfigLoadError> {
    let defaults = PluginServiceConfig::default();
    let file = &file.plugin_service;

    let server = compose_server(
        &file.server,
        &env.plugin_service_host,
        env.plugin_service_port,
        defaults.server,
    );

    let runner = RunnerConfig {
        program: env
            .runner_program
            .clone()
            .or(file.runner.program.clone())
            .unwrap_or(defaults.runner.program),
        args: env
            .runner_args
            .clone()
            .or(file.runner.args.clone())
            .unwrap_or(defaults.runner.args),
        api_url: env
            .runner_api_url
            .clone()
            .or(file.runner.api_url.clone())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", server.port)),
        debug: env
            .runner_debug
            .or(file.runner.debug)
            .unwrap_or(defaults.runner.debug),
    };

    let max_runtime = env
        .max_runtime
        .or(file.supervision.max_runtime_secs.map(Duration::from_secs))
        .or(defaults.supervision.max_runtime);
    let supervision = SupervisionConfig {
        stop_grace: env
            .stop_grace
            .or(file.supervision.stop_grace_ms.map(Duration::from_millis))
            .unwrap_or(defaults.supervision.stop_grace),
        max_runtime: max_runtime.filter(|limit| !limit.is_zero()),
    };

    if runner.program.trim().is_empty() {
        return Err(ConfigLoadError::Invalid("runner program must not be empty".into()));
    }
    validate_url("runner.api_url", &runner.api_url)?;

    Ok(PluginServiceConfig {
        server,
        runner,
        supervision,
    })
}

pub(crate) fn compose_task_engine(
    file: &FileConfig,
    env: &EnvConfig,
) -> Result<TaskEngineConfig, ConfigLoadError> {
    let defaults = TaskEngineConfig::default();
    let file = &file.task_engine;

    let server = compose_server(
        &file.server,
        &env.task_engine_host,
        env.task_engine_port,
        defaults.server,
    );

    let plugin_service = PluginServiceClientConfig {
        url: env
            .plugin_service_url
            .clone()
            .or(file.plugin_service.url.clone())
            .unwrap_or(defaults.plugin_service.url),
        request_timeout: env
            .plugin_service_timeout
            .or(file.plugin_service.request_timeout_ms.map(Duration::from_millis))
            .unwrap_or(defaults.plugin_service.request_timeout),
    };
    validate_url("plugin_service.url", &plugin_service.url)?;

    let coordinator = CoordinatorConfig {
        tick_interval: env
            .tick_interval
            .or(file.coordinator.tick_interval_ms.map(Duration::from_millis))
            .unwrap_or(defaults.coordinator.tick_interval),
        stop_grace: env
            .scan_stop_grace
            .or(file.coordinator.stop_grace_ms.map(Duration::from_millis))
            .unwrap_or(defaults.coordinator.stop_grace),
    };
    if coordinator.tick_interval.is_zero() {
        return Err(ConfigLoadError::Invalid(
            "coordinator tick interval must be greater than zero".into(),
        ));
    }

    let database = DatabaseConfig {
        kind: env.database_kind.or(file.database.kind).unwrap_or_default(),
        location: env
            .database_location
            .clone()
            .or(file.database.location.clone()),
    };
    if database.kind == DatabaseKind::Files && database.location.is_none() {
        return Err(ConfigLoadError::Invalid(
            "the `files` scan database requires a location".into(),
        ));
    }

    let artifacts = ArtifactsConfig {
        root: env
            .artifacts_root
            .clone()
            .or(file.artifacts.root.clone())
            .unwrap_or(defaults.artifacts.root),
    };

    Ok(TaskEngineConfig {
        server,
        plugin_service,
        coordinator,
        database,
        artifacts,
        plans_path: env.plans_path.clone().or(file.plans.path.clone()),
    })
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigLoadError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|source| ConfigLoadError::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        })
}
