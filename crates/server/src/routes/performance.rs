use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::performance::PerformanceReport;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

pub async fn get_analysis(
    State(deployment): State<DeploymentImpl>,
) -> ResponseJson<ApiResponse<PerformanceReport>> {
    ResponseJson(ApiResponse::success(
        deployment.performance().analyze().await,
    ))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/performance/analysis", get(get_analysis))
}
