mod support;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use picket_core::TaskEngineError;
use picket_core::scan_database::{MemoryScanDatabase, ScanDatabase};
use picket_model::{
    Configuration, ErrorCode, PluginSessionState, ScanId, ScanState, SessionCommand, SessionId,
};
use serde_json::json;
use support::{Call, FlakyDatabase, harness, harness_with};

fn target(url: &str) -> Configuration {
    let mut configuration = Configuration::new();
    configuration.insert("target".into(), json!(url));
    configuration
}

fn assert_one_action_per_session(calls: &[Call]) {
    let mut actions: HashMap<SessionId, usize> = HashMap::new();
    for call in calls.iter().filter(|call| call.is_action()) {
        *actions.entry(call.session().unwrap()).or_default() += 1;
    }
    for (session, count) in actions {
        assert!(count <= 1, "session {session} got {count} actions in one tick");
    }
}

#[tokio::test]
async fn create_makes_one_plugin_session_per_step_in_order() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", target("https://example.com"))
        .await
        .unwrap();

    assert_eq!(scan.state, ScanState::Created);
    assert_eq!(scan.sessions.len(), 2);
    assert_ne!(scan.sessions[0].id, scan.sessions[1].id);
    assert!(
        scan.sessions
            .iter()
            .all(|session| session.state == PluginSessionState::Created && !session.done)
    );
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![
            Call::Create("HSTSPlugin".into()),
            Call::Create("XFrameOptionsPlugin".into())
        ]
    );
    assert_eq!(h.engine.active_scans(), 1);
}

#[tokio::test]
async fn overrides_are_merged_over_step_defaults() {
    let h = harness();
    let mut overrides = target("https://example.com");
    overrides.insert("ports".into(), json!("443"));
    let scan = h.engine.create_session("tickle", overrides).await.unwrap();
    let remote = h
        .plugin_service
        .summary_of(scan.sessions[2].id)
        .configuration;
    assert_eq!(remote["ports"], "443");
    assert_eq!(remote["target"], "https://example.com");
}

#[tokio::test]
async fn unknown_plan_and_scan_are_reported() {
    let h = harness();
    let err = h
        .engine
        .create_session("nope", Configuration::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoSuchPlan);

    let missing = ScanId::new();
    assert_eq!(
        h.engine.get_session(missing).await.unwrap_err().code(),
        ErrorCode::NoSuchScan
    );
    assert_eq!(
        h.engine.start(missing).await.unwrap_err().code(),
        ErrorCode::NoSuchScan
    );
}

#[tokio::test]
async fn stop_on_created_scan_fails_and_changes_nothing() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();

    let err = h.engine.stop(scan.id).await.unwrap_err();
    assert!(matches!(
        err,
        TaskEngineError::InvalidStateTransition {
            state: ScanState::Created,
            ..
        }
    ));
    assert_eq!(
        h.engine.get_session(scan.id).await.unwrap().state,
        ScanState::Created
    );
}

#[tokio::test]
async fn start_twice_is_rejected() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    h.engine.start(scan.id).await.unwrap();
    assert_eq!(
        h.engine.start(scan.id).await.unwrap_err().code(),
        ErrorCode::InvalidStateTransition
    );
}

#[tokio::test]
async fn created_scans_are_not_advanced() {
    let h = harness();
    h.engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    h.plugin_service.take_calls();

    h.engine.tick().await;
    assert!(h.plugin_service.take_calls().is_empty());
}

#[tokio::test]
async fn plan_steps_run_one_after_another() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", target("https://example.com"))
        .await
        .unwrap();
    let (first, second) = (scan.sessions[0].id, scan.sessions[1].id);
    h.plugin_service.take_calls();
    h.engine.start(scan.id).await.unwrap();

    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![Call::Get(first), Call::Change(first, SessionCommand::Start)]
    );

    // The second step waits for the first to be collected.
    h.plugin_service.add_issues(first, 2);
    for _ in 0..3 {
        h.engine.tick().await;
        assert_eq!(
            h.plugin_service.take_calls(),
            vec![Call::Get(first), Call::Results(first)]
        );
    }
    assert_eq!(h.plugin_service.state_of(second), PluginSessionState::Created);

    h.plugin_service.set_state(first, PluginSessionState::Finished);
    h.engine.tick().await;
    let calls = h.plugin_service.take_calls();
    assert_one_action_per_session(&calls);
    assert_eq!(
        calls,
        vec![
            Call::Get(first),
            Call::Results(first),
            Call::Get(second),
            Call::Change(second, SessionCommand::Start),
        ]
    );
    assert!(h.engine.get_session(scan.id).await.unwrap().sessions[0].done);

    h.plugin_service.set_state(second, PluginSessionState::Failed);
    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![Call::Get(second), Call::Results(second)]
    );

    let finished = h.engine.get_session(scan.id).await.unwrap();
    assert_eq!(finished.state, ScanState::Finished);
    assert!(finished.all_done());
    assert!(finished.finished.is_some());
    assert_eq!(finished.sessions[0].issues.len(), 2);
    assert_eq!(finished.sessions[1].state, PluginSessionState::Failed);
    assert_eq!(h.engine.active_scans(), 0);

    h.engine.tick().await;
    assert!(h.plugin_service.take_calls().is_empty());
}

#[tokio::test]
async fn stopping_scan_stops_running_and_retires_unstarted_sessions() {
    let h = harness_with(Arc::new(MemoryScanDatabase::new()), Duration::ZERO);
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    let (first, second) = (scan.sessions[0].id, scan.sessions[1].id);
    h.engine.start(scan.id).await.unwrap();
    h.engine.tick().await;
    h.plugin_service.take_calls();

    h.engine.stop(scan.id).await.unwrap();
    h.engine.stop(scan.id).await.unwrap();
    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![
            Call::Get(first),
            Call::Change(first, SessionCommand::Stop),
            Call::Get(second),
        ]
    );
    let stopping = h.engine.get_session(scan.id).await.unwrap();
    assert_eq!(stopping.state, ScanState::Stopping);
    assert!(stopping.sessions[1].done);

    // Still running after the (zero) grace period: escalate once.
    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![Call::Get(first), Call::Change(first, SessionCommand::Terminate)]
    );
    h.engine.tick().await;
    assert_eq!(h.plugin_service.take_calls(), vec![Call::Get(first)]);

    h.plugin_service.add_issues(first, 1);
    h.plugin_service.set_state(first, PluginSessionState::Stopped);
    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.take_calls(),
        vec![Call::Get(first), Call::Results(first)]
    );

    let stopped = h.engine.get_session(scan.id).await.unwrap();
    assert_eq!(stopped.state, ScanState::Stopped);
    assert_eq!(stopped.sessions[0].issues.len(), 1);
    h.engine.stop(scan.id).await.unwrap();
}

#[tokio::test]
async fn results_cursor_never_repeats_issues() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    let first = scan.sessions[0].id;
    h.engine.start(scan.id).await.unwrap();
    h.engine.tick().await;
    h.plugin_service.add_issues(first, 3);
    h.engine.tick().await;

    let (results, token) = h.engine.results(scan.id, None).await.unwrap();
    assert_eq!(results.sessions[0].issues.len(), 3);
    let token = token.expect("scan still running").encode();

    let (again, next) = h.engine.results(scan.id, Some(&token)).await.unwrap();
    assert!(again.sessions.iter().all(|session| session.issues.is_empty()));
    assert_eq!(next.unwrap().encode(), token);

    h.plugin_service.add_issues(first, 1);
    h.engine.tick().await;
    let (fresh, _) = h.engine.results(scan.id, Some(&token)).await.unwrap();
    assert_eq!(fresh.sessions[0].issues.len(), 1);
    assert_eq!(fresh.sessions[0].issues[0].report.summary, "finding 1");

    assert_eq!(
        h.engine
            .results(scan.id, Some("!!not-a-token"))
            .await
            .unwrap_err()
            .code(),
        ErrorCode::InvalidToken
    );
}

#[tokio::test]
async fn unreachable_plugin_service_skips_the_tick() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    h.engine.start(scan.id).await.unwrap();
    h.plugin_service.take_calls();

    h.plugin_service.set_unreachable(true);
    h.engine.tick().await;
    let unchanged = h.engine.get_session(scan.id).await.unwrap();
    assert_eq!(unchanged.sessions[0].state, PluginSessionState::Created);

    h.plugin_service.set_unreachable(false);
    h.engine.tick().await;
    assert_eq!(
        h.plugin_service.state_of(scan.sessions[0].id),
        PluginSessionState::Started
    );
}

#[tokio::test]
async fn failed_persist_keeps_scan_active_until_retry_succeeds() {
    let database = FlakyDatabase::failing(1);
    let h = harness_with(database.clone(), Duration::from_secs(30));
    let scan = h
        .engine
        .create_session("diagnostics", Configuration::new())
        .await
        .unwrap();
    h.engine.start(scan.id).await.unwrap();
    for session in &scan.sessions {
        h.plugin_service.set_state(session.id, PluginSessionState::Finished);
    }

    h.engine.tick().await;
    assert_eq!(h.engine.active_scans(), 1);
    assert_eq!(
        h.engine.get_session(scan.id).await.unwrap().state,
        ScanState::Finished
    );
    assert!(database.load(scan.id).await.unwrap().is_none());

    h.engine.tick().await;
    assert_eq!(h.engine.active_scans(), 0);
    assert!(database.load(scan.id).await.unwrap().is_some());
}

#[tokio::test]
async fn delete_only_removes_stored_scans() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    assert_eq!(
        h.engine.delete_session(scan.id).await.unwrap_err().code(),
        ErrorCode::InvalidStateTransition
    );

    h.engine.start(scan.id).await.unwrap();
    for session in &scan.sessions {
        h.plugin_service.set_state(session.id, PluginSessionState::Aborted);
    }
    h.engine.tick().await;
    h.engine.delete_session(scan.id).await.unwrap();
    assert_eq!(
        h.engine.delete_session(scan.id).await.unwrap_err().code(),
        ErrorCode::NoSuchScan
    );
}

#[tokio::test]
async fn artifacts_of_finished_sessions_are_saved_by_session_id() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    let first = scan.sessions[0].id;
    h.engine.start(scan.id).await.unwrap();
    let file = h.plugin_service.add_file(first, "report.txt", b"all clear");
    h.plugin_service.set_state(first, PluginSessionState::Finished);

    h.engine.tick().await;
    let saved = h
        .artifacts
        .path()
        .join(first.to_string())
        .join(file.to_string())
        .join("report.txt");
    assert_eq!(std::fs::read(saved).unwrap(), b"all clear");
    assert!(h.engine.get_session(scan.id).await.unwrap().sessions[0].artifacts);
}

#[tokio::test]
async fn artifacts_sharing_a_file_name_are_all_kept() {
    let h = harness();
    let scan = h
        .engine
        .create_session("basic", Configuration::new())
        .await
        .unwrap();
    let first = scan.sessions[0].id;
    h.engine.start(scan.id).await.unwrap();
    let a = h.plugin_service.add_file(first, "report.txt", b"from a");
    let b = h.plugin_service.add_file(first, "report.txt", b"from b");
    h.plugin_service.set_state(first, PluginSessionState::Finished);

    h.engine.tick().await;
    let session_dir = h.artifacts.path().join(first.to_string());
    assert_eq!(std::fs::read_dir(&session_dir).unwrap().count(), 2);
    assert_eq!(
        std::fs::read(session_dir.join(a.to_string()).join("report.txt")).unwrap(),
        b"from a"
    );
    assert_eq!(
        std::fs::read(session_dir.join(b.to_string()).join("report.txt")).unwrap(),
        b"from b"
    );
}

#[tokio::test]
async fn plugin_service_rejection_surfaces_its_code() {
    let h = harness();
    let mut registry = picket_core::task_engine::PlanRegistry::empty();
    registry.insert(picket_model::Plan {
        name: "broken".into(),
        description: String::new(),
        workflow: vec![picket_model::PlanStep::new("MissingPlugin")],
    });
    let engine = picket_core::TaskEngine::new(
        picket_config::CoordinatorConfig::default(),
        registry,
        h.plugin_service.clone(),
        Arc::new(MemoryScanDatabase::new()),
        picket_core::task_engine::ArtifactStore::new(h.artifacts.path()),
    );
    let err = engine
        .create_session("broken", Configuration::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::NoSuchPlugin);
    assert_eq!(engine.active_scans(), 0);
}
