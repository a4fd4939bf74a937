use std::sync::Arc;

use anyhow::Error as AnyhowError;
use async_trait::async_trait;
use db::{DBService, DbErr};
use services::services::{
    config::{ConfigError, DashboardConfig},
    dashboard::DashboardService,
    notifier::AlertNotifier,
    performance::PerformanceService,
    quality_checks::QualityCheckRecorder,
    run_tracker::RunTracker,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeploymentError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Other(#[from] AnyhowError),
}

/// Everything a request handler can reach. Built once at startup and cloned per request.
#[async_trait]
pub trait Deployment: Clone + Send + Sync + 'static {
    async fn new() -> Result<Self, DeploymentError>;

    fn config(&self) -> &Arc<DashboardConfig>;

    fn db(&self) -> &DBService;

    fn tracker(&self) -> &RunTracker;

    fn quality_checks(&self) -> &QualityCheckRecorder;

    fn dashboard(&self) -> &DashboardService;

    fn performance(&self) -> &PerformanceService;

    fn notifier(&self) -> &AlertNotifier;

    /// Lets pending failure alerts finish, then releases the connection pool. Handlers
    /// still holding a clone see closed-pool errors.
    async fn close(&self) {
        self.tracker().drain_alerts().await;
        if let Err(err) = self.db().clone().close().await {
            tracing::warn!(error = %err, "Failed to close database pool");
        } else {
            tracing::info!("Database pool closed");
        }
    }
}
