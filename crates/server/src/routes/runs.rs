use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    response::Json as ResponseJson,
    routing::{get, post},
};
use db::models::etl_run::{CompleteEtlRun, EtlRun};
use deployment::Deployment;
use serde::{Deserialize, Serialize};
use services::services::dashboard::RunFilter;
use ts_rs::TS;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize, TS)]
pub struct StartRunRequest {
    pub job_name: String,
}

#[derive(Debug, Serialize, TS)]
pub struct StartRunResponse {
    pub run_id: i64,
    pub job_name: String,
}

pub async fn start_run(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<StartRunRequest>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<StartRunResponse>>, ApiError> {
    let Json(payload) = payload?;
    let run_id = deployment.tracker().start(&payload.job_name).await?;
    Ok(ResponseJson(ApiResponse::success(StartRunResponse {
        run_id,
        job_name: payload.job_name.trim().to_string(),
    })))
}

pub async fn list_runs(
    State(deployment): State<DeploymentImpl>,
    filter: Result<Query<RunFilter>, QueryRejection>,
) -> Result<ResponseJson<ApiResponse<Vec<EtlRun>>>, ApiError> {
    let Query(filter) = filter?;
    let runs = deployment.dashboard().recent_runs(&filter).await;
    Ok(ResponseJson(ApiResponse::success(runs)))
}

pub async fn get_run(
    State(deployment): State<DeploymentImpl>,
    run_id: Result<Path<i64>, PathRejection>,
) -> Result<ResponseJson<ApiResponse<EtlRun>>, ApiError> {
    let Path(run_id) = run_id?;
    let run = deployment.tracker().find(run_id).await?;
    Ok(ResponseJson(ApiResponse::success(run)))
}

pub async fn complete_run(
    State(deployment): State<DeploymentImpl>,
    run_id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<CompleteEtlRun>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<EtlRun>>, ApiError> {
    let Path(run_id) = run_id?;
    let Json(payload) = payload?;
    let run = deployment.tracker().complete(run_id, payload).await?;
    Ok(ResponseJson(ApiResponse::success(run)))
}

pub fn router() -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/", get(list_runs).post(start_run))
        .route("/{run_id}", get(get_run))
        .route("/{run_id}/complete", post(complete_run));

    Router::new().nest("/runs", inner)
}
