use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::dashboard::{DashboardOverview, PipelineHealth};
use utils::response::ApiResponse;

use crate::DeploymentImpl;

pub async fn get_summary(
    State(deployment): State<DeploymentImpl>,
) -> ResponseJson<ApiResponse<DashboardOverview>> {
    ResponseJson(ApiResponse::success(deployment.dashboard().summary().await))
}

pub async fn get_health(
    State(deployment): State<DeploymentImpl>,
) -> ResponseJson<ApiResponse<PipelineHealth>> {
    ResponseJson(ApiResponse::success(
        deployment.dashboard().health_report().await,
    ))
}

pub fn router() -> Router<DeploymentImpl> {
    let inner = Router::new()
        .route("/summary", get(get_summary))
        .route("/health", get(get_health));

    Router::new().nest("/dashboard", inner)
}
