//! Plugin Service endpoints: the control API used by the Task Engine and the
//! report API used by plugin processes.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use picket_core::{PluginServiceHandle, plugin_service::SessionReport};
use picket_model::{
    ApiResponse, ArtifactReport, Configuration, ErrorCode, FileId, IssueReport,
    PluginsBody, Progress, ReportedError, SessionBody, SessionCommand, SessionResultsBody,
};
use tracing::debug;

use super::{parse_configuration, parse_session_id};
use crate::errors::{ApiError, ApiJson, ApiResult};

pub async fn list_plugins(
    State(service): State<PluginServiceHandle>,
) -> Json<ApiResponse<PluginsBody>> {
    Json(ApiResponse::success(PluginsBody {
        plugins: service.plugins(),
    }))
}

pub async fn create_session(
    State(service): State<PluginServiceHandle>,
    Path(plugin_name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<SessionBody>>> {
    let configuration = parse_configuration(&body)?;
    let session = service.create(&plugin_name, configuration).await?;
    Ok(Json(ApiResponse::success(SessionBody { session })))
}

/// Body is `START`, `STOP` or `TERMINATE`, bare or as a JSON string.
pub async fn change_state(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    let command: SessionCommand = body
        .parse()
        .map_err(|_| ApiError::bad_request(ErrorCode::UnknownState))?;
    service.change_state(id, command).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn get_session(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<SessionBody>>> {
    let id = parse_session_id(&id)?;
    let session = service.get(id).await?;
    Ok(Json(ApiResponse::success(SessionBody { session })))
}

pub async fn session_results(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<SessionResultsBody>>> {
    let id = parse_session_id(&id)?;
    let (session, issues) = service.results(id).await?;
    Ok(Json(ApiResponse::success(SessionResultsBody { session, issues })))
}

/// Raw artifact bytes.
pub async fn session_file(
    State(service): State<PluginServiceHandle>,
    Path((id, file_id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_session_id(&id)?;
    let file_id =
        FileId::parse(&file_id).map_err(|_| ApiError::not_found(ErrorCode::NoSuchFile))?;
    let (record, bytes) = service.file(id, file_id).await?;
    debug!(session_id = %id, file = %record.name, size = bytes.len(), "serving artifact");
    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
}

/// The bare configuration object, without an envelope, as plugin processes
/// expect it.
pub async fn session_configuration(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
) -> ApiResult<Json<Configuration>> {
    let id = parse_session_id(&id)?;
    Ok(Json(service.configuration(id).await?))
}

pub async fn report_progress(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
    ApiJson(progress): ApiJson<Progress>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    service.report(id, SessionReport::Progress(progress)).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn report_results(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
    ApiJson(issues): ApiJson<Vec<IssueReport>>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    service.report(id, SessionReport::Results(issues)).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn report_errors(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
    ApiJson(errors): ApiJson<Vec<ReportedError>>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    service.report(id, SessionReport::Errors(errors)).await?;
    Ok(Json(ApiResponse::ok()))
}

pub async fn report_files(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
    ApiJson(artifacts): ApiJson<Vec<ArtifactReport>>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    for artifact in artifacts {
        service.report(id, SessionReport::Artifacts(artifact)).await?;
    }
    Ok(Json(ApiResponse::ok()))
}

/// The body, if any, is ignored.
pub async fn report_finish(
    State(service): State<PluginServiceHandle>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_session_id(&id)?;
    service.report(id, SessionReport::Finish).await?;
    Ok(Json(ApiResponse::ok()))
}
