use std::sync::Arc;

use async_trait::async_trait;
use db::DBService;
use deployment::{Deployment, DeploymentError};
use services::services::{
    analytics::AnalyticsProvider,
    catalog::CatalogAnalytics,
    config::DashboardConfig,
    dashboard::DashboardService,
    notifier::AlertNotifier,
    performance::PerformanceService,
    quality_checks::QualityCheckRecorder,
    query_cache::QueryCache,
    run_tracker::RunTracker,
    table_status::SqlTableCatalog,
};

#[derive(Clone)]
pub struct LocalDeployment {
    config: Arc<DashboardConfig>,
    db: DBService,
    tracker: RunTracker,
    quality_checks: QualityCheckRecorder,
    dashboard: DashboardService,
    performance: PerformanceService,
    notifier: AlertNotifier,
}

impl LocalDeployment {
    /// Connects to the configured database and wires every service against it, with the
    /// catalog of that same database as the analytics provider.
    pub async fn from_config(config: DashboardConfig) -> Result<Self, DeploymentError> {
        let url = config.database.connection_url()?;
        let db = DBService::connect(&url, &config.database.pool_settings()).await?;
        let analytics = CatalogAnalytics::new(db.clone(), config.database.query_timeout);
        Ok(Self::from_parts(config, db, Arc::new(analytics)))
    }

    pub fn from_parts(
        config: DashboardConfig,
        db: DBService,
        analytics: Arc<dyn AnalyticsProvider>,
    ) -> Self {
        let query_timeout = config.database.query_timeout;
        let notifier = AlertNotifier::new(&config.alerts, config.database.name.clone());
        let tracker = RunTracker::new(db.clone(), notifier.clone(), query_timeout);
        let quality_checks = QualityCheckRecorder::new(db.clone(), query_timeout);
        let dashboard = DashboardService::new(
            db.clone(),
            QueryCache::new(&config.cache),
            config.limits,
            query_timeout,
            Arc::new(SqlTableCatalog::new(db.clone())),
            config.monitored_tables.clone(),
            config.alerts.threshold_failures,
        );
        let performance = PerformanceService::new(dashboard.clone(), analytics.clone());

        tracing::info!(
            monitored_tables = config.monitored_tables.len(),
            alerts_enabled = notifier.is_enabled(),
            analytics = analytics.name(),
            query_timeout_secs = query_timeout.as_secs(),
            "Deployment ready"
        );

        Self {
            config: Arc::new(config),
            db,
            tracker,
            quality_checks,
            dashboard,
            performance,
            notifier,
        }
    }
}

#[async_trait]
impl Deployment for LocalDeployment {
    async fn new() -> Result<Self, DeploymentError> {
        Self::from_config(DashboardConfig::from_env()).await
    }

    fn config(&self) -> &Arc<DashboardConfig> {
        &self.config
    }

    fn db(&self) -> &DBService {
        &self.db
    }

    fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    fn quality_checks(&self) -> &QualityCheckRecorder {
        &self.quality_checks
    }

    fn dashboard(&self) -> &DashboardService {
        &self.dashboard
    }

    fn performance(&self) -> &PerformanceService {
        &self.performance
    }

    fn notifier(&self) -> &AlertNotifier {
        &self.notifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_config() -> DashboardConfig {
        DashboardConfig::from_env_with(|name| match name {
            "DATABASE_URL" => Some("sqlite::memory:".to_string()),
            "MONITORED_TABLES" => Some("etl_runs:start_time,FE_DMV_ALL".to_string()),
            _ => None,
        })
    }

    #[tokio::test]
    async fn wires_services_against_one_pool() {
        let deployment = LocalDeployment::from_config(sqlite_config()).await.unwrap();
        assert!(!deployment.notifier().is_enabled());
        assert_eq!(deployment.config().monitored_tables.len(), 2);

        let run_id = deployment.tracker().start("wiring_job").await.unwrap();
        let runs = deployment
            .dashboard()
            .recent_runs(&Default::default())
            .await;
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, run_id);

        let report = deployment.performance().analyze().await;
        assert_eq!(report.existing_tables, 1);
        assert!(report.analytics.available);
        assert_eq!(report.analytics.provider, "catalog");
        let catalog = report.analytics.catalog.unwrap();
        assert!(catalog.tables_missing_pk.is_empty());
        assert!(catalog.database.connection_healthy);

        deployment.close().await;
    }
}
