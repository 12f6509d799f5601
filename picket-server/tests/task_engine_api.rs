#![cfg(unix)]

mod support;

use std::time::Duration;

use anyhow::Result;
use axum::http::StatusCode;
use picket_core::task_engine::PlanRegistry;
use picket_model::{PluginSessionState, ScanId, SessionId};
use serde_json::{Value, json};
use support::{EngineFixture, LivePluginService, Runner, error_code, eventually};

const NEVER: Duration = Duration::from_secs(3600);

async fn fixture(script: &str) -> Result<(LivePluginService, EngineFixture)> {
    let plugin_service = LivePluginService::start(Runner::shell(script)).await?;
    let engine = EngineFixture::new(&plugin_service.url(), NEVER, PlanRegistry::builtin())?;
    Ok((plugin_service, engine))
}

#[tokio::test]
async fn plans_are_listed_and_described() -> Result<()> {
    let (_plugin_service, engine) = fixture("exit 0").await?;
    let server = engine.test_server()?;

    let response = server.get("/plans").await;
    response.assert_status(StatusCode::OK);
    let body = response.json::<Value>();
    let names: Vec<&str> = body["plans"]
        .as_array()
        .expect("plans")
        .iter()
        .filter_map(|plan| plan["name"].as_str())
        .collect();
    assert!(names.contains(&"tickle"));
    assert!(names.contains(&"basic"));

    let response = server.get("/plan/basic").await;
    response.assert_status(StatusCode::OK);
    let workflow = response.json::<Value>()["plan"]["workflow"].clone();
    assert_eq!(workflow[0]["plugin_name"], "HSTSPlugin");
    assert_eq!(workflow[1]["plugin_name"], "XFrameOptionsPlugin");

    let response = server.get("/plan/nope").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response.json()), Some("no-such-plan"));
    Ok(())
}

#[tokio::test]
async fn create_scan_creates_remote_sessions_in_plan_order() -> Result<()> {
    let (plugin_service, engine) = fixture("exit 0").await?;
    let server = engine.test_server()?;

    let response = server
        .put("/scan/create/basic")
        .json(&json!({"target": "http://example.test"}))
        .await;
    response.assert_status(StatusCode::OK);
    let scan = response.json::<Value>()["scan"].clone();
    assert_eq!(scan["state"], "CREATED");
    assert_eq!(scan["configuration"]["target"], "http://example.test");

    let sessions = scan["sessions"].as_array().expect("sessions");
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["plugin"]["name"], "HSTSPlugin");
    assert_eq!(sessions[1]["plugin"]["name"], "XFrameOptionsPlugin");

    let first = SessionId::parse(sessions[0]["id"].as_str().expect("id"))?;
    let remote = plugin_service.handle.get(first).await?;
    assert_eq!(remote.state, PluginSessionState::Created);
    assert_eq!(remote.configuration["target"], "http://example.test");

    let response = server.put("/scan/create/unknown").await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response.json()), Some("no-such-plan"));
    Ok(())
}

#[tokio::test]
async fn malformed_scan_ids_and_tokens_are_rejected() -> Result<()> {
    let (_plugin_service, engine) = fixture("exit 0").await?;
    let server = engine.test_server()?;

    let response = server.get("/scan/bogus").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), Some("invalid-scan-id"));

    let response = server.post("/scan/bogus/state").text("START").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), Some("invalid-scan-id"));

    let missing = ScanId::new();
    let response = server.get(&format!("/scan/{missing}")).await;
    response.assert_status(StatusCode::NOT_FOUND);
    assert_eq!(error_code(&response.json()), Some("no-such-scan"));

    let response = server
        .get(&format!("/scan/{missing}/results"))
        .add_query_param("token", "%%%")
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), Some("invalid-token"));
    Ok(())
}

#[tokio::test]
async fn unreachable_plugin_service_is_reported() -> Result<()> {
    let engine = EngineFixture::new("http://127.0.0.1:9", NEVER, PlanRegistry::builtin())?;
    let server = engine.test_server()?;

    let response = server.put("/scan/create/basic").await;
    response.assert_status(StatusCode::BAD_GATEWAY);
    assert_eq!(error_code(&response.json()), Some("plugin-service-unavailable"));
    Ok(())
}

#[tokio::test]
async fn scan_runs_stops_and_is_deleted() -> Result<()> {
    let (plugin_service, fixture) = fixture("exec sleep 30").await?;
    let server = fixture.test_server()?;
    let engine = fixture.engine.clone();

    let scan = server.put("/scan/create/basic").await.json::<Value>()["scan"].clone();
    let id = scan["id"].as_str().expect("scan id").to_string();
    let state_path = format!("/scan/{id}/state");

    let response = server.post(&state_path).text("PAUSE").await;
    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(error_code(&response.json()), Some("unknown-state"));

    server.post(&state_path).text("START").await.assert_status(StatusCode::OK);
    let response = server.post(&state_path).json(&"START").await;
    response.assert_status(StatusCode::CONFLICT);
    assert_eq!(error_code(&response.json()), Some("invalid-state-transition"));

    let response = server.delete(&format!("/scan/{id}")).await;
    response.assert_status(StatusCode::CONFLICT);

    // First tick starts the first plugin session only.
    engine.tick().await;
    let first = SessionId::parse(scan["sessions"][0]["id"].as_str().expect("id"))?;
    let second = SessionId::parse(scan["sessions"][1]["id"].as_str().expect("id"))?;
    assert_eq!(plugin_service.handle.get(first).await?.state, PluginSessionState::Started);
    assert_eq!(plugin_service.handle.get(second).await?.state, PluginSessionState::Created);

    let response = server.get(&format!("/scan/{id}/results")).await;
    response.assert_status(StatusCode::OK);
    assert!(response.json::<Value>()["token"].is_string());

    server.post(&state_path).text("STOP").await.assert_status(StatusCode::OK);
    let (server_ref, scan_path) = (&server, format!("/scan/{id}"));
    let scan_path = scan_path.as_str();
    let stopped = eventually(Duration::from_secs(15), move || {
        let engine = engine.clone();
        async move {
            engine.tick().await;
            let body = server_ref.get(scan_path).await.json::<Value>();
            Ok((body["scan"]["state"] == "STOPPED").then_some(body))
        }
    })
    .await?;
    assert!(stopped["scan"]["finished"].is_string());
    assert_eq!(stopped["scan"]["sessions"][0]["state"], "STOPPED");
    assert_eq!(
        plugin_service.handle.get(second).await?.state,
        PluginSessionState::Created
    );

    let response = server.get(&format!("/scan/{id}/results")).await;
    response.assert_status(StatusCode::OK);
    let body = response.json::<Value>();
    assert_eq!(body["scan"]["state"], "STOPPED");
    assert!(body.get("token").is_none());

    server
        .post(&state_path)
        .text("STOP")
        .await
        .assert_status(StatusCode::OK);

    server.delete(scan_path).await.assert_status(StatusCode::OK);
    let response = server.get(scan_path).await;
    response.assert_status(StatusCode::NOT_FOUND);
    Ok(())
}
