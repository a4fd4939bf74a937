use axum::{
    Router,
    extract::{Query, State, rejection::QueryRejection},
    response::Json as ResponseJson,
    routing::get,
};
use db::models::job_stats::JobStats;
use deployment::Deployment;
use serde::Deserialize;
use utils::response::ApiResponse;

use crate::{DeploymentImpl, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct JobStatsQuery {
    pub limit: Option<u64>,
}

pub async fn list_job_stats(
    State(deployment): State<DeploymentImpl>,
    query: Result<Query<JobStatsQuery>, QueryRejection>,
) -> Result<ResponseJson<ApiResponse<Vec<JobStats>>>, ApiError> {
    let Query(query) = query?;
    let jobs = deployment.dashboard().job_stats(query.limit).await;
    Ok(ResponseJson(ApiResponse::success(jobs)))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/jobs", get(list_job_stats))
}
