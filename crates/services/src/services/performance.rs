use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{
    analytics::{AnalyticsProvider, AnalyticsReport},
    dashboard::DashboardService,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum LatencyGrade {
    Excellent,
    Acceptable,
    Poor,
    Unreachable,
}

impl LatencyGrade {
    pub fn from_latency(latency: Option<Duration>) -> Self {
        match latency {
            None => LatencyGrade::Unreachable,
            Some(d) if d < Duration::from_secs(1) => LatencyGrade::Excellent,
            Some(d) if d < Duration::from_secs(5) => LatencyGrade::Acceptable,
            Some(_) => LatencyGrade::Poor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct PerformanceReport {
    pub checked_at: DateTime<Utc>,
    pub ping_ms: Option<f64>,
    pub latency: LatencyGrade,
    pub monitored_tables: usize,
    pub existing_tables: usize,
    pub analytics: AnalyticsReport,
}

/// Store latency, table coverage and whatever the analytics provider can add.
#[derive(Clone)]
pub struct PerformanceService {
    dashboard: DashboardService,
    analytics: Arc<dyn AnalyticsProvider>,
}

impl PerformanceService {
    pub fn new(dashboard: DashboardService, analytics: Arc<dyn AnalyticsProvider>) -> Self {
        Self {
            dashboard,
            analytics,
        }
    }

    pub async fn analyze(&self) -> PerformanceReport {
        let latency = match self.dashboard.ping().await {
            Ok(elapsed) => Some(elapsed),
            Err(err) => {
                tracing::warn!(error = %err, "Database ping failed during performance analysis");
                None
            }
        };
        let tables = self.dashboard.table_status().await;

        let analytics = match self.analytics.analyze().await {
            Ok(report) => report,
            Err(err) => {
                tracing::warn!(
                    provider = self.analytics.name(),
                    error = %err,
                    "Analytics provider failed"
                );
                AnalyticsReport {
                    provider: self.analytics.name().to_string(),
                    available: false,
                    ..Default::default()
                }
            }
        };

        PerformanceReport {
            checked_at: Utc::now(),
            ping_ms: latency.map(|d| (d.as_secs_f64() * 100_000.0).round() / 100.0),
            latency: LatencyGrade::from_latency(latency),
            monitored_tables: tables.tables.len(),
            existing_tables: tables.existing_tables,
            analytics,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use db::{DBService, PoolSettings};

    use super::*;
    use crate::services::{
        analytics::{AnalyticsError, AnalyticsFinding, NullAnalytics},
        config::{MonitoredTable, QueryLimits},
        query_cache::QueryCache,
        table_status::SqlTableCatalog,
    };

    struct IndexAdvisor;

    #[async_trait]
    impl AnalyticsProvider for IndexAdvisor {
        fn name(&self) -> &str {
            "index_advisor"
        }

        async fn analyze(&self) -> Result<AnalyticsReport, AnalyticsError> {
            Ok(AnalyticsReport {
                provider: self.name().to_string(),
                available: true,
                findings: vec![AnalyticsFinding {
                    category: "index".to_string(),
                    severity: "info".to_string(),
                    message: "etl_runs(start_time) is indexed".to_string(),
                }],
                ..Default::default()
            })
        }
    }

    struct BrokenProvider;

    #[async_trait]
    impl AnalyticsProvider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn analyze(&self) -> Result<AnalyticsReport, AnalyticsError> {
            Err(AnalyticsError::Provider("schema unreadable".to_string()))
        }
    }

    async fn dashboard() -> DashboardService {
        let db = DBService::connect("sqlite::memory:", &PoolSettings::default())
            .await
            .unwrap();
        DashboardService::new(
            db.clone(),
            QueryCache::disabled(),
            QueryLimits::default(),
            Duration::from_secs(5),
            Arc::new(SqlTableCatalog::new(db)),
            vec![
                MonitoredTable::new("etl_runs").with_timestamp_column("start_time"),
                MonitoredTable::new("FE_DMV_ALL"),
            ],
            5,
        )
    }

    #[test]
    fn latency_grades() {
        assert_eq!(LatencyGrade::from_latency(None), LatencyGrade::Unreachable);
        assert_eq!(
            LatencyGrade::from_latency(Some(Duration::from_millis(20))),
            LatencyGrade::Excellent
        );
        assert_eq!(
            LatencyGrade::from_latency(Some(Duration::from_millis(1500))),
            LatencyGrade::Acceptable
        );
        assert_eq!(
            LatencyGrade::from_latency(Some(Duration::from_secs(5))),
            LatencyGrade::Poor
        );
    }

    #[tokio::test]
    async fn without_provider_reports_unavailable() {
        let service = PerformanceService::new(dashboard().await, Arc::new(NullAnalytics));
        let report = service.analyze().await;
        assert_eq!(report.latency, LatencyGrade::Excellent);
        assert_eq!(report.monitored_tables, 2);
        assert_eq!(report.existing_tables, 1);
        assert!(!report.analytics.available);
    }

    #[tokio::test]
    async fn provider_findings_are_passed_through() {
        let service = PerformanceService::new(dashboard().await, Arc::new(IndexAdvisor));
        let report = service.analyze().await;
        assert!(report.analytics.available);
        assert_eq!(report.analytics.findings.len(), 1);

        let broken = PerformanceService::new(dashboard().await, Arc::new(BrokenProvider));
        let report = broken.analyze().await;
        assert!(!report.analytics.available);
        assert_eq!(report.analytics.provider, "broken");
    }
}
