use axum::{Router, routing::get};

use crate::{DeploymentImpl, routes};

pub fn router(deployment: DeploymentImpl) -> Router {
    let api_routes = Router::new()
        .merge(routes::runs::router())
        .merge(routes::jobs::router())
        .merge(routes::quality_checks::router())
        .merge(routes::dashboard::router())
        .merge(routes::tables::router())
        .merge(routes::performance::router());

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .fallback(routes::health::not_found)
        .with_state(deployment)
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
        response::Response,
    };
    use db::{DBService, PoolSettings};
    use serde_json::{Value, json};
    use services::services::{catalog::CatalogAnalytics, config::DashboardConfig};
    use tower::ServiceExt;

    use crate::DeploymentImpl;

    async fn setup_deployment() -> DeploymentImpl {
        let config = DashboardConfig::from_env_with(|name| match name {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "CACHE_TTL_HEALTH" | "CACHE_TTL_DATA" | "CACHE_TTL_METRICS" => Some("0".to_string()),
            "MONITORED_TABLES" => Some("etl_runs:start_time,FE_DMV_ALL".to_string()),
            _ => None,
        });
        let db = DBService::connect("sqlite::memory:", &PoolSettings::default())
            .await
            .unwrap();
        let analytics = CatalogAnalytics::new(db.clone(), Duration::from_secs(5));
        DeploymentImpl::from_parts(config, db, Arc::new(analytics))
    }

    async fn send(
        deployment: &DeploymentImpl,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        super::router(deployment.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn start(deployment: &DeploymentImpl, job_name: &str) -> i64 {
        let response = send(
            deployment,
            Method::POST,
            "/api/runs",
            Some(json!({ "job_name": job_name })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        json_body(response).await["data"]["run_id"]
            .as_i64()
            .unwrap()
    }

    #[tokio::test]
    async fn health_is_ok() {
        let deployment = setup_deployment().await;
        let response = send(&deployment, Method::GET, "/health", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"], "OK");
    }

    #[tokio::test]
    async fn run_lifecycle_over_http() {
        let deployment = setup_deployment().await;
        let run_id = start(&deployment, "job_a").await;

        let response = send(
            &deployment,
            Method::POST,
            &format!("/api/runs/{run_id}/complete"),
            Some(json!({ "status": "success", "rows_processed": 1000, "memory_used_mb": 256.5 })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let run = json_body(response).await;
        assert_eq!(run["data"]["status"], "success");
        assert!(run["data"]["end_time"].is_string());

        let response = send(&deployment, Method::GET, &format!("/api/runs/{run_id}"), None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["data"]["rows_processed"], 1000);

        let response = send(&deployment, Method::GET, "/api/jobs", None).await;
        let jobs = json_body(response).await;
        assert_eq!(jobs["data"][0]["job_name"], "job_a");
        assert_eq!(jobs["data"][0]["total_runs"], 1);
        assert_eq!(jobs["data"][0]["successful_runs"], 1);
        assert_eq!(jobs["data"][0]["total_rows_processed"], 1000);
        assert_eq!(jobs["data"][0]["last_run_status"], "success");

        let uri = "/api/runs?job_name=job_a&limit=10";
        let response = send(&deployment, Method::GET, uri, None).await;
        let runs = json_body(response).await;
        assert_eq!(runs["data"].as_array().unwrap().len(), 1);

        let response = send(&deployment, Method::GET, "/api/dashboard/summary", None).await;
        let summary = json_body(response).await;
        assert_eq!(summary["data"]["total_runs"], 1);
        assert_eq!(summary["data"]["success_rate"], 100.0);
    }

    #[tokio::test]
    async fn write_errors_map_to_statuses() {
        let deployment = setup_deployment().await;

        let response = send(
            &deployment,
            Method::POST,
            "/api/runs",
            Some(json!({ "job_name": "   " })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);

        let response = send(&deployment, Method::GET, "/api/runs/424242", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = send(
            &deployment,
            Method::POST,
            "/api/runs/424242/complete",
            Some(json!({ "status": "failed" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let run_id = start(&deployment, "job_b").await;
        let response = send(
            &deployment,
            Method::POST,
            &format!("/api/runs/{run_id}/complete"),
            Some(json!({ "status": "running" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let failed = json!({ "status": "failed", "error_message": "timeout" });
        let uri = format!("/api/runs/{run_id}/complete");
        let response = send(&deployment, Method::POST, &uri, Some(failed.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        let run = json_body(response).await;
        assert_eq!(run["data"]["error_message"], "timeout");

        let response = send(&deployment, Method::POST, &uri, Some(failed)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let response = send(&deployment, Method::GET, "/api/jobs", None).await;
        let jobs = json_body(response).await;
        assert_eq!(jobs["data"][0]["failed_runs"], 1);
    }

    #[tokio::test]
    async fn malformed_input_uses_validation_envelope() {
        let deployment = setup_deployment().await;
        let run_id = start(&deployment, "job_d").await;

        let response = send(
            &deployment,
            Method::POST,
            &format!("/api/runs/{run_id}/complete"),
            Some(json!({ "status": "bogus" })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert!(body["message"].as_str().unwrap().contains("status"));

        let response = send(
            &deployment,
            Method::POST,
            "/api/quality-checks",
            Some(json!({
                "check_name": "freshness",
                "table_name": "FE_DMV_ALL",
                "check_type": "vibes",
                "status": "passed"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);

        let response = send(&deployment, Method::GET, "/api/runs/not-a-number", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["success"], false);

        let response = send(&deployment, Method::GET, "/api/runs?status=bogus", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&deployment, Method::GET, "/api/jobs?limit=-3", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // the run is untouched by the rejected completion
        let uri = format!("/api/runs/{run_id}");
        let response = send(&deployment, Method::GET, &uri, None).await;
        assert_eq!(json_body(response).await["data"]["status"], "running");

        let response = send(&deployment, Method::GET, "/api/nowhere", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["success"], false);
    }

    #[tokio::test]
    async fn quality_checks_over_http() {
        let deployment = setup_deployment().await;
        let check = json!({
            "check_name": "no_null_slugs",
            "table_name": "FE_DMV_ALL",
            "check_type": "null_check",
            "expected_count": 0,
            "actual_count": 0,
            "status": "passed"
        });

        let first = json_body(
            send(&deployment, Method::POST, "/api/quality-checks", Some(check.clone())).await,
        )
        .await;
        let second = json_body(
            send(&deployment, Method::POST, "/api/quality-checks", Some(check)).await,
        )
        .await;
        assert_ne!(first["data"]["check_id"], second["data"]["check_id"]);

        let response = send(
            &deployment,
            Method::POST,
            "/api/quality-checks",
            Some(json!({
                "check_name": "",
                "table_name": "FE_DMV_ALL",
                "check_type": "row_count",
                "status": "failed"
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(
            &deployment,
            Method::GET,
            "/api/quality-checks?table_name=FE_DMV_ALL",
            None,
        )
        .await;
        assert_eq!(json_body(response).await["data"].as_array().unwrap().len(), 2);

        let uri = "/api/quality-checks/summary?days=30";
        let response = send(&deployment, Method::GET, uri, None).await;
        let summary = json_body(response).await;
        assert_eq!(summary["data"]["window_days"], 30);
        assert_eq!(summary["data"]["counts"]["passed"], 2);
        assert_eq!(summary["data"]["pass_rate"], 100.0);
    }

    #[tokio::test]
    async fn monitoring_reports_over_http() {
        let deployment = setup_deployment().await;
        start(&deployment, "job_c").await;

        let response = send(&deployment, Method::GET, "/api/tables/status", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let report = json_body(response).await;
        assert_eq!(report["data"]["existing_tables"], 1);
        assert_eq!(report["data"]["missing_tables"], 1);
        assert_eq!(report["data"]["tables"][1]["status"], "missing");

        let response = send(&deployment, Method::GET, "/api/dashboard/health", None).await;
        let health = json_body(response).await;
        assert_eq!(health["data"]["database_connected"], true);
        assert_eq!(health["data"]["alert"], false);

        let response = send(&deployment, Method::GET, "/api/performance/analysis", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let analysis = json_body(response).await;
        assert_eq!(analysis["data"]["analytics"]["available"], true);
        assert_eq!(analysis["data"]["analytics"]["provider"], "catalog");
        assert!(
            analysis["data"]["analytics"]["catalog"]["primary_keys"]
                .as_array()
                .unwrap()
                .iter()
                .any(|key| key["table_name"] == "etl_runs")
        );
        assert_eq!(analysis["data"]["latency"], "excellent");
    }
}
