use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
};
use picket_core::TaskEngine;
use picket_model::{
    ApiResponse, ErrorCode, PlanBody, PlansBody, ScanBody, ScanCommand, ScanResultsBody,
};
use serde::Deserialize;

use super::{parse_configuration, parse_scan_id};
use crate::errors::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct ResultsQuery {
    pub token: Option<String>,
}

pub async fn list_plans(State(engine): State<TaskEngine>) -> Json<ApiResponse<PlansBody>> {
    Json(ApiResponse::success(PlansBody {
        plans: engine.get_plans(),
    }))
}

pub async fn get_plan(
    State(engine): State<TaskEngine>,
    Path(name): Path<String>,
) -> ApiResult<Json<ApiResponse<PlanBody>>> {
    let plan = engine.get_plan(&name)?;
    Ok(Json(ApiResponse::success(PlanBody { plan })))
}

pub async fn create_scan(
    State(engine): State<TaskEngine>,
    Path(plan_name): Path<String>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<ScanBody>>> {
    let configuration = parse_configuration(&body)?;
    let scan = engine.create_session(&plan_name, configuration).await?;
    Ok(Json(ApiResponse::success(ScanBody { scan })))
}

/// Body is `START` or `STOP`, bare or as a JSON string.
pub async fn change_scan_state(
    State(engine): State<TaskEngine>,
    Path(id): Path<String>,
    body: String,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_scan_id(&id)?;
    let command: ScanCommand = body
        .parse()
        .map_err(|_| ApiError::bad_request(ErrorCode::UnknownState))?;
    match command {
        ScanCommand::Start => engine.start(id).await?,
        ScanCommand::Stop => engine.stop(id).await?,
    }
    Ok(Json(ApiResponse::ok()))
}

pub async fn get_scan(
    State(engine): State<TaskEngine>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<ScanBody>>> {
    let id = parse_scan_id(&id)?;
    let scan = engine.get_session(id).await?;
    Ok(Json(ApiResponse::success(ScanBody { scan })))
}

pub async fn scan_results(
    State(engine): State<TaskEngine>,
    Path(id): Path<String>,
    Query(query): Query<ResultsQuery>,
) -> ApiResult<Json<ApiResponse<ScanResultsBody>>> {
    let id = parse_scan_id(&id)?;
    let (scan, next) = engine.results(id, query.token.as_deref()).await?;
    Ok(Json(ApiResponse::success(ScanResultsBody {
        scan,
        token: next.map(|cursor| cursor.encode()),
    })))
}

pub async fn delete_scan(
    State(engine): State<TaskEngine>,
    Path(id): Path<String>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let id = parse_scan_id(&id)?;
    engine.delete_session(id).await?;
    Ok(Json(ApiResponse::ok()))
}
