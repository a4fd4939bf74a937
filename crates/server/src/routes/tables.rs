use axum::{Router, extract::State, response::Json as ResponseJson, routing::get};
use deployment::Deployment;
use services::services::table_status::TableStatusReport;
use utils::response::ApiResponse;

use crate::DeploymentImpl;

pub async fn get_table_status(
    State(deployment): State<DeploymentImpl>,
) -> ResponseJson<ApiResponse<TableStatusReport>> {
    ResponseJson(ApiResponse::success(
        deployment.dashboard().table_status().await,
    ))
}

pub fn router() -> Router<DeploymentImpl> {
    Router::new().route("/tables/status", get(get_table_status))
}
