//! `picket-plugin-service`: supervises one plugin process per session and
//! serves the Plugin Service API.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use picket_config::{
    ConfigLoad, ConfigLoader, PluginServiceConfig, RunnerConfig, models::DEFAULT_RUNNER_PROGRAM,
};
use picket_core::{PluginService, plugins::builtin_catalog};
use picket_server::{
    infra::{init_tracing, shutdown_signal},
    plugin_service_router,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

const DEFAULT_LOG_FILTER: &str = "info,picket_core=info,tower_http=warn";

#[derive(Parser, Debug)]
#[command(name = "picket-plugin-service")]
#[command(about = "Runs security plugins as supervised processes")]
struct Cli {
    /// Configuration file (TOML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// `.env` file to load before reading the environment
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Listen host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Program launched for every plugin session
    #[arg(long)]
    runner: Option<String>,

    /// Base URL plugin processes use to reach this service
    #[arg(long)]
    api_url: Option<String>,

    /// Pass `--debug` to plugin runners
    #[arg(long, default_value_t = false)]
    debug_plugins: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(DEFAULT_LOG_FILTER);

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    if let Some(path) = &cli.env_file {
        loader = loader.with_env_file(path);
    }
    let ConfigLoad {
        mut config,
        config_path,
        env_file_loaded,
    } = loader
        .load_plugin_service()
        .context("failed to load configuration")?;

    if env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    apply_overrides(&mut config, &cli);

    info!(
        runner.program = %config.runner.program,
        runner.api_url = %config.runner.api_url,
        supervision.stop_grace_ms = config.supervision.stop_grace.as_millis() as u64,
        supervision.max_runtime_secs =
            config.supervision.max_runtime.map(|limit| limit.as_secs()).unwrap_or(0),
        "plugin service configuration in effect"
    );

    let address = config.server.bind_address();
    let (service, supervisor) = PluginService::spawn(config, builtin_catalog());

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(address = %listener.local_addr()?, "plugin service listening");

    axum::serve(listener, plugin_service_router(service.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("plugin service server failed")?;

    service.shutdown();
    if let Err(err) = supervisor.await {
        warn!(error = %err, "supervisor task ended abnormally");
    }
    info!("plugin service stopped");
    Ok(())
}

fn apply_overrides(config: &mut PluginServiceConfig, cli: &Cli) {
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(runner) = &cli.runner {
        config.runner.program = runner.clone();
    } else if config.runner.program == DEFAULT_RUNNER_PROGRAM
        && let Some(sibling) = sibling_runner()
    {
        config.runner.program = sibling.to_string_lossy().into_owned();
    }
    if let Some(api_url) = &cli.api_url {
        config.runner.api_url = api_url.clone();
    } else if config.runner.api_url == RunnerConfig::default().api_url {
        // Default callback address follows the listener port.
        config.runner.api_url = format!("http://127.0.0.1:{}", config.server.port);
    }
    if cli.debug_plugins {
        config.runner.debug = true;
    }
}

/// A runner installed next to this binary takes precedence over `PATH`.
fn sibling_runner() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let candidate = exe
        .parent()?
        .join(DEFAULT_RUNNER_PROGRAM)
        .with_extension(std::env::consts::EXE_EXTENSION);
    candidate.is_file().then_some(candidate)
}
