//! Both services on real listeners, with plugins running in real
//! `picket-plugin-runner` processes.
#![cfg(unix)]

mod support;

use std::time::Duration;

use anyhow::{Result, ensure};
use picket_core::task_engine::PlanRegistry;
use picket_model::{Plan, PlanStep};
use picket_server::task_engine_router;
use serde_json::{Value, json};
use support::{EngineFixture, LivePluginService, Runner, eventually, serve};
use tokio::net::TcpListener;

const TIMEOUT: Duration = Duration::from_secs(30);

async fn json_of(response: reqwest::Response) -> Result<Value> {
    Ok(response.json::<Value>().await?)
}

/// Create a session for `plugin`, start it and wait for a terminal state.
async fn run_session(
    client: &reqwest::Client,
    base: &str,
    plugin: &str,
    configuration: Value,
) -> Result<Value> {
    let created = json_of(
        client
            .put(format!("{base}/session/create/{plugin}"))
            .json(&configuration)
            .send()
            .await?,
    )
    .await?;
    let id = created["session"]["id"].as_str().unwrap_or_default().to_string();
    let started = json_of(
        client
            .put(format!("{base}/session/{id}/state"))
            .body("START")
            .send()
            .await?,
    )
    .await?;
    ensure!(started["success"] == true, "START rejected: {started}");

    let url = format!("{base}/session/{id}");
    eventually(TIMEOUT, || {
        let request = client.get(&url);
        async move {
            let body = json_of(request.send().await?).await?;
            let terminal = matches!(
                body["session"]["state"].as_str(),
                Some("FINISHED" | "ABORTED" | "FAILED" | "STOPPED")
            );
            Ok(terminal.then_some(body["session"].clone()))
        }
    })
    .await
}

#[tokio::test]
async fn incremental_plan_runs_to_completion() -> Result<()> {
    let plugin_service = LivePluginService::start(Runner::binary()).await?;

    let mut plans = PlanRegistry::builtin();
    plans.insert(Plan {
        name: "quick".into(),
        description: "Three quick findings".into(),
        workflow: vec![
            PlanStep::new("IncrementalAsyncPlugin")
                .with_default("interval_ms", 20)
                .with_default("count", 3),
        ],
    });
    let fixture = EngineFixture::new(&plugin_service.url(), Duration::from_millis(50), plans)?;
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = serve(listener, task_engine_router(fixture.engine.clone())).await?;
    let base = format!("http://{addr}");
    let client = reqwest::Client::new();

    let created = json_of(client.put(format!("{base}/scan/create/quick")).send().await?).await?;
    let id = created["scan"]["id"].as_str().unwrap_or_default().to_string();
    let started = json_of(
        client
            .post(format!("{base}/scan/{id}/state"))
            .body("START")
            .send()
            .await?,
    )
    .await?;
    assert_eq!(started, json!({"success": true}));

    let url = format!("{base}/scan/{id}");
    let scan = eventually(TIMEOUT, || {
        let request = client.get(&url);
        async move {
            let body = json_of(request.send().await?).await?;
            Ok((body["scan"]["state"] == "FINISHED").then_some(body["scan"].clone()))
        }
    })
    .await?;
    assert_eq!(scan["sessions"][0]["state"], "FINISHED");
    assert!(scan["finished"].is_string());

    let results = json_of(client.get(format!("{base}/scan/{id}/results")).send().await?).await?;
    assert!(results.get("token").is_none());
    let issues = results["scan"]["sessions"][0]["issues"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    assert_eq!(issues.len(), 3);
    assert!(issues.iter().all(|issue| issue["severity"] == "Low"));

    let dates: Vec<&str> = issues.iter().filter_map(|issue| issue["date"].as_str()).collect();
    let mut sorted = dates.clone();
    sorted.sort();
    assert_eq!(dates, sorted);
    Ok(())
}

#[tokio::test]
async fn plugin_outcomes_map_to_terminal_states() -> Result<()> {
    let plugin_service = LivePluginService::start(Runner::binary()).await?;
    let base = plugin_service.url();
    let client = reqwest::Client::new();

    let aborted = run_session(&client, &base, "AbortedPlugin", json!({})).await?;
    assert_eq!(aborted["state"], "ABORTED");
    assert_eq!(aborted["exit_code"], 1);

    let failed = run_session(&client, &base, "ExceptionPlugin", json!({})).await?;
    assert_eq!(failed["state"], "FAILED");
    assert_eq!(failed["exit_code"], 2);
    let messages: Vec<&str> = failed["errors"]
        .as_array()
        .map(|errors| errors.iter().filter_map(|e| e["message"].as_str()).collect())
        .unwrap_or_default();
    assert!(messages.iter().any(|m| m.contains("deliberate failure")));

    let finished = run_session(
        &client,
        &base,
        "IssueGeneratingPlugin",
        json!({"count": 1, "delay_ms": 0}),
    )
    .await?;
    assert_eq!(finished["state"], "FINISHED");
    let id = finished["id"].as_str().unwrap_or_default();
    let results = json_of(client.get(format!("{base}/session/{id}/results")).send().await?).await?;
    assert_eq!(results["issues"].as_array().map(Vec::len), Some(4));
    Ok(())
}

#[tokio::test]
async fn stopped_runner_ends_stopped() -> Result<()> {
    let plugin_service = LivePluginService::start(Runner::binary()).await?;
    let base = plugin_service.url();
    let client = reqwest::Client::new();

    let created = json_of(
        client
            .put(format!("{base}/session/create/LongRunningPlugin"))
            .json(&json!({"duration_ms": 60_000}))
            .send()
            .await?,
    )
    .await?;
    let id = created["session"]["id"].as_str().unwrap_or_default().to_string();
    let state_url = format!("{base}/session/{id}/state");
    client.put(&state_url).body("START").send().await?;

    // The first progress report means the runner is up and handling signals.
    let url = format!("{base}/session/{id}");
    eventually(TIMEOUT, || {
        let request = client.get(&url);
        async move {
            let body = json_of(request.send().await?).await?;
            Ok(body["session"]["progress"].is_object().then_some(()))
        }
    })
    .await?;

    let stopped = json_of(client.put(&state_url).body("STOP").send().await?).await?;
    assert_eq!(stopped["success"], true);

    let session = eventually(TIMEOUT, || {
        let request = client.get(&url);
        async move {
            let body = json_of(request.send().await?).await?;
            Ok(body["session"]["state"]
                .as_str()
                .filter(|state| *state != "STARTED")
                .map(|_| body["session"].clone()))
        }
    })
    .await?;
    assert_eq!(session["state"], "STOPPED");
    assert!(session["duration_ms"].as_u64().is_some());
    Ok(())
}
