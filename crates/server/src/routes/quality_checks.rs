use axum::{
    Json, Router,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    response::Json as ResponseJson,
    routing::get,
};
use db::models::quality_check::{CreateQualityCheck, QualityCheck};
use deployment::Deployment;
use serde::Deserialize;
use services::services::dashboard::{QualityCheckFilter, QualitySummary};
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub days: Option<i64>,
}

pub async fn record_quality_check(
    State(deployment): State<DeploymentImpl>,
    payload: Result<Json<CreateQualityCheck>, JsonRejection>,
) -> Result<ResponseJson<ApiResponse<QualityCheck>>, ApiError> {
    let Json(payload) = payload?;
    let check = deployment.quality_checks().record(&payload).await?;
    Ok(ResponseJson(ApiResponse::success(check)))
}

pub async fn list_quality_checks(
    State(deployment): State<DeploymentImpl>,
    filter: Result<Query<QualityCheckFilter>, QueryRejection>,
) -> Result<ResponseJson<ApiResponse<Vec<QualityCheck>>>, ApiError> {
    let Query(filter) = filter?;
    let checks = deployment.dashboard().recent_quality_checks(&filter).await;
    Ok(ResponseJson(ApiResponse::success(checks)))
}

pub async fn quality_summary(
    State(deployment): State<DeploymentImpl>,
    query: Result<Query<SummaryQuery>, QueryRejection>,
) -> Result<ResponseJson<ApiResponse<QualitySummary>>, ApiError> {
    let Query(query) = query?;
    let summary = deployment.dashboard().quality_summary(query.days).await;
    Ok(ResponseJson(ApiResponse::success(summary)))
}

pub fn router() -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/", get(list_quality_checks).post(record_quality_check))
        .route("/summary", get(quality_summary));

    Router::new().nest("/quality-checks", inner)
}
