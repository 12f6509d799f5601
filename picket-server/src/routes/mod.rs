use axum::{
    Router,
    routing::{get, post, put},
};
use picket_core::{PluginServiceHandle, TaskEngine};
use tower_http::trace::TraceLayer;

use crate::handlers::{plugin_service, task_engine};

/// Plugin Service API: control calls from the Task Engine and report calls
/// from plugin processes.
pub fn plugin_service_router(service: PluginServiceHandle) -> Router {
    Router::new()
        .route("/plugins", get(plugin_service::list_plugins))
        .route(
            "/session/create/{plugin_name}",
            put(plugin_service::create_session),
        )
        .route("/session/{id}", get(plugin_service::get_session))
        .route("/session/{id}/state", put(plugin_service::change_state))
        .route("/session/{id}/results", get(plugin_service::session_results))
        .route(
            "/session/{id}/file/{file_id}",
            get(plugin_service::session_file),
        )
        .route(
            "/session/{id}/configuration",
            get(plugin_service::session_configuration),
        )
        .route(
            "/session/{id}/report/progress",
            post(plugin_service::report_progress),
        )
        .route(
            "/session/{id}/report/results",
            post(plugin_service::report_results),
        )
        .route(
            "/session/{id}/report/errors",
            post(plugin_service::report_errors),
        )
        .route(
            "/session/{id}/report/files",
            post(plugin_service::report_files),
        )
        .route(
            "/session/{id}/report/finish",
            post(plugin_service::report_finish),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Task Engine API.
pub fn task_engine_router(engine: TaskEngine) -> Router {
    Router::new()
        .route("/plans", get(task_engine::list_plans))
        .route("/plan/{name}", get(task_engine::get_plan))
        .route("/scan/create/{plan_name}", put(task_engine::create_scan))
        .route(
            "/scan/{id}",
            get(task_engine::get_scan).delete(task_engine::delete_scan),
        )
        .route("/scan/{id}/state", post(task_engine::change_scan_state))
        .route("/scan/{id}/results", get(task_engine::scan_results))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}
