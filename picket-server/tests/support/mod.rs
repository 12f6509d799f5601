//! Shared fixtures for picket-server integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use axum::Router;
use axum_test::TestServer;
use picket_config::{CoordinatorConfig, PluginServiceConfig, RunnerConfig, SupervisionConfig};
use picket_core::plugins::builtin_catalog;
use picket_core::scan_database::MemoryScanDatabase;
use picket_core::task_engine::{ArtifactStore, HttpPluginServiceClient, PlanRegistry, TaskEngine};
use picket_core::{PluginService, PluginServiceHandle};
use picket_server::{plugin_service_router, task_engine_router};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

/// Runner program and leading arguments.
#[derive(Debug, Clone)]
pub struct Runner {
    pub program: String,
    pub args: Vec<String>,
}

impl Runner {
    /// `/bin/sh -c <script>`; `$1 $2` are `--plugin <name>`.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            program: "/bin/sh".into(),
            args: vec!["-c".into(), script.into(), "runner".into()],
        }
    }

    /// The real `picket-plugin-runner` built alongside these tests.
    pub fn binary() -> Self {
        Self {
            program: env!("CARGO_BIN_EXE_picket-plugin-runner").into(),
            args: Vec::new(),
        }
    }
}

fn plugin_service_config(runner: Runner, api_url: String) -> PluginServiceConfig {
    PluginServiceConfig {
        runner: RunnerConfig {
            program: runner.program,
            args: runner.args,
            api_url,
            debug: false,
        },
        supervision: SupervisionConfig {
            stop_grace: Duration::from_secs(5),
            max_runtime: Some(Duration::from_secs(120)),
        },
        ..PluginServiceConfig::default()
    }
}

pub fn test_server(router: Router) -> Result<TestServer> {
    TestServer::new(router).map_err(|err| anyhow!(err.to_string()))
}

/// Plugin Service behind an in-process test transport. Plugin processes
/// cannot call back into it.
pub fn plugin_service_test_app(runner: Runner) -> Result<(TestServer, PluginServiceHandle)> {
    let config = plugin_service_config(runner, "http://127.0.0.1:9".into());
    let (handle, _task) = PluginService::spawn(config, builtin_catalog());
    let server = test_server(plugin_service_router(handle.clone()))?;
    Ok((server, handle))
}

/// Serve `router` on an ephemeral local port.
pub async fn serve(listener: TcpListener, router: Router) -> Result<SocketAddr> {
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    Ok(addr)
}

/// A Plugin Service on a real listener, reachable by plugin processes.
#[derive(Debug)]
pub struct LivePluginService {
    pub addr: SocketAddr,
    pub handle: PluginServiceHandle,
}

impl LivePluginService {
    pub async fn start(runner: Runner) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let config = plugin_service_config(runner, format!("http://{addr}"));
        let (handle, _task) = PluginService::spawn(config, builtin_catalog());
        serve(listener, plugin_service_router(handle.clone())).await?;
        Ok(Self { addr, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Task Engine wired to a live Plugin Service with an in-memory database.
#[derive(Debug)]
pub struct EngineFixture {
    pub engine: TaskEngine,
    pub artifacts: TempDir,
}

impl EngineFixture {
    pub fn new(plugin_service_url: &str, tick_interval: Duration, plans: PlanRegistry) -> Result<Self> {
        let artifacts = tempfile::tempdir().context("failed to create artifacts dir")?;
        let client = HttpPluginServiceClient::new(plugin_service_url, Duration::from_secs(5))?;
        let engine = TaskEngine::new(
            CoordinatorConfig {
                tick_interval,
                stop_grace: Duration::from_secs(5),
            },
            plans,
            Arc::new(client),
            Arc::new(MemoryScanDatabase::new()),
            ArtifactStore::new(artifacts.path().to_path_buf()),
        );
        Ok(Self { engine, artifacts })
    }

    pub fn test_server(&self) -> Result<TestServer> {
        test_server(task_engine_router(self.engine.clone()))
    }
}

/// Poll `probe` until it yields `Some`, failing after `timeout`.
pub async fn eventually<T, F, Fut>(timeout: Duration, mut probe: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<Option<T>>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = probe().await? {
            return Ok(value);
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// `body["error"]` as a string, for envelope assertions.
pub fn error_code(body: &Value) -> Option<&str> {
    body.get("error").and_then(Value::as_str)
}
