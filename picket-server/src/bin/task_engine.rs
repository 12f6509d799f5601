//! `picket-task-engine`: expands plans into plugin sessions and coordinates
//! them through the Plugin Service.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use picket_config::{ConfigLoad, ConfigLoader, DatabaseKind, TaskEngineConfig};
use picket_core::TaskEngine;
use picket_server::{
    infra::{init_tracing, shutdown_signal},
    task_engine_router,
};
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_LOG_FILTER: &str = "info,picket_core=info,tower_http=warn";

#[derive(Parser, Debug)]
#[command(name = "picket-task-engine")]
#[command(about = "Coordinates scan plans across the Picket Plugin Service")]
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

    /// Plugin Service base URL
    #[arg(long)]
    plugin_service_url: Option<String>,

    /// Scan database backend: `memory` or `files`
    #[arg(long)]
    database: Option<DatabaseKind>,

    /// Directory for the `files` scan database
    #[arg(long)]
    database_location: Option<PathBuf>,

    /// Root directory for retrieved artifacts
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Additional plan definitions (TOML or JSON)
    #[arg(long)]
    plans: Option<PathBuf>,
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
        .load_task_engine()
        .context("failed to load configuration")?;

    if env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = &config_path {
        info!(path = %path.display(), "loaded configuration file");
    }
    apply_overrides(&mut config, cli);
    if config.database.kind == DatabaseKind::Files && config.database.location.is_none() {
        anyhow::bail!("the files scan database needs a location");
    }

    info!(
        plugin_service.url = %config.plugin_service.url,
        coordinator.tick_interval_ms = config.coordinator.tick_interval.as_millis() as u64,
        coordinator.stop_grace_ms = config.coordinator.stop_grace.as_millis() as u64,
        database.kind = %config.database.kind,
        artifacts.root = %config.artifacts.root.display(),
        "task engine configuration in effect"
    );

    let engine = TaskEngine::from_config(&config).context("failed to build task engine")?;

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(address = %listener.local_addr()?, "task engine listening");

    axum::serve(listener, task_engine_router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("task engine server failed")?;

    engine.shutdown().await;
    info!("task engine stopped");
    Ok(())
}

fn apply_overrides(config: &mut TaskEngineConfig, cli: Cli) {
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(url) = cli.plugin_service_url {
        config.plugin_service.url = url;
    }
    if let Some(kind) = cli.database {
        config.database.kind = kind;
    }
    if let Some(location) = cli.database_location {
        config.database.location = Some(location);
    }
    if let Some(root) = cli.artifacts {
        config.artifacts.root = root;
    }
    if let Some(path) = cli.plans {
        config.plans_path = Some(path);
    }
}
