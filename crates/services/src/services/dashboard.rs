//! Read side of the monitor.
//!
//! Every query here is fronted by [`QueryCache`], bounded by [`QueryLimits`] and run under
//! the store timeout. Failures never reach the caller: they are logged and replaced by an
//! empty or default result so the dashboard keeps rendering.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use db::{
    DBService, DbErr,
    models::{
        dashboard_summary::DashboardSummary,
        etl_run::{EtlRun, RunQuery},
        job_stats::JobStats,
        quality_check::{QualityCheck, QualityCheckQuery, QualityStatusCounts},
    },
    types::{QualityCheckStatus, QualityCheckType, RunStatus},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::{
    config::{MonitoredTable, QueryLimits},
    query_cache::{CacheClass, QueryCache},
    storage::{StorageError, with_timeout},
    table_status::{TableCatalog, TableStatusReport, collect_table_status},
};

const HEALTH_LOOKBACK_HOURS: i64 = 24;
const LONG_RUNNING_MINUTES: f64 = 30.0;

/// Filters accepted by the run listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct RunFilter {
    pub job_name: Option<String>,
    pub status: Option<RunStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub days: Option<i64>,
    pub limit: Option<u64>,
}

/// Filters accepted by the quality check listing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct QualityCheckFilter {
    pub table_name: Option<String>,
    pub status: Option<QualityCheckStatus>,
    pub check_type: Option<QualityCheckType>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub days: Option<i64>,
    pub limit: Option<u64>,
}

/// A resolved listing bound: rows in `[since, until]`, at most `limit` of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u64,
}

impl QueryLimits {
    pub fn clamp_limit(&self, limit: Option<u64>) -> u64 {
        limit
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }

    pub fn clamp_days(&self, days: Option<i64>) -> i64 {
        days.unwrap_or(self.default_window_days)
            .clamp(1, self.max_window_days.max(1))
    }

    /// Resolves caller bounds against `now`. `since` and `until` only ever narrow the
    /// clamped window.
    pub fn window(
        &self,
        now: DateTime<Utc>,
        days: Option<i64>,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        limit: Option<u64>,
    ) -> Window {
        let floor = now - chrono::Duration::days(self.clamp_days(days));
        Window {
            since: since.map_or(floor, |since| since.max(floor)),
            until,
            limit: self.clamp_limit(limit),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct QualitySummary {
    pub window_days: i64,
    pub counts: QualityStatusCounts,
    pub pass_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct DashboardOverview {
    #[serde(flatten)]
    #[ts(flatten)]
    pub summary: DashboardSummary,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Healthy,
    Degraded,
    #[default]
    Unhealthy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
pub struct PipelineHealth {
    pub status: PipelineState,
    pub checked_at: Option<DateTime<Utc>>,
    pub database_connected: bool,
    pub ping_ms: Option<f64>,
    pub failed_runs: Vec<EtlRun>,
    pub long_running_runs: Vec<EtlRun>,
    pub failure_threshold: u64,
    pub alert: bool,
}

#[derive(Clone)]
pub struct DashboardService {
    db: DBService,
    cache: QueryCache,
    limits: QueryLimits,
    query_timeout: Duration,
    catalog: Arc<dyn TableCatalog>,
    monitored_tables: Arc<Vec<MonitoredTable>>,
    failure_threshold: u64,
}

impl DashboardService {
    pub fn new(
        db: DBService,
        cache: QueryCache,
        limits: QueryLimits,
        query_timeout: Duration,
        catalog: Arc<dyn TableCatalog>,
        monitored_tables: Vec<MonitoredTable>,
        failure_threshold: u64,
    ) -> Self {
        Self {
            db,
            cache,
            limits,
            query_timeout,
            catalog,
            monitored_tables: Arc::new(monitored_tables),
            failure_threshold,
        }
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Cache lookup, then the loader under the store timeout. Any failure degrades to
    /// `T::default()`.
    async fn read<T, P, F, Fut>(
        &self,
        class: CacheClass,
        query: &'static str,
        params: &P,
        loader: F,
    ) -> T
    where
        T: Clone + Default + Send + Sync + 'static,
        P: Serialize + ?Sized,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DbErr>>,
    {
        let timeout = self.query_timeout;
        let result = self
            .cache
            .cached(class, query, params, || {
                with_timeout(timeout, async move { loader().await.map_err(StorageError::from) })
            })
            .await;

        match result {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(query, error = %err, "Read query failed; returning empty result");
                T::default()
            }
        }
    }

    pub async fn recent_runs(&self, filter: &RunFilter) -> Vec<EtlRun> {
        self.read(CacheClass::Data, "recent_runs", filter, || async {
            let window = self.limits.window(
                Utc::now(),
                filter.days,
                filter.since,
                filter.until,
                filter.limit,
            );
            let query = RunQuery {
                job_name: filter.job_name.clone(),
                status: filter.status,
                since: window.since,
                until: window.until,
                limit: window.limit,
            };
            EtlRun::list(&self.db.pool, &query).await
        })
        .await
    }

    pub async fn job_stats(&self, limit: Option<u64>) -> Vec<JobStats> {
        let limit = self.limits.clamp_limit(limit);
        self.read(CacheClass::Data, "job_stats", &limit, || async {
            JobStats::list(&self.db.pool, limit).await
        })
        .await
    }

    pub async fn recent_quality_checks(&self, filter: &QualityCheckFilter) -> Vec<QualityCheck> {
        self.read(CacheClass::Data, "recent_quality_checks", filter, || async {
            let window = self.limits.window(
                Utc::now(),
                filter.days,
                filter.since,
                filter.until,
                filter.limit,
            );
            let query = QualityCheckQuery {
                table_name: filter.table_name.clone(),
                status: filter.status,
                check_type: filter.check_type,
                since: window.since,
                until: window.until,
                limit: window.limit,
            };
            QualityCheck::list(&self.db.pool, &query).await
        })
        .await
    }

    pub async fn quality_summary(&self, days: Option<i64>) -> QualitySummary {
        let days = self.limits.clamp_days(days);
        self.read(CacheClass::Metrics, "quality_summary", &days, || async {
            let since = Utc::now() - chrono::Duration::days(days);
            let counts = QualityCheck::count_by_status_since(&self.db.pool, since).await?;
            Ok::<_, DbErr>(QualitySummary {
                window_days: days,
                pass_rate: counts.pass_rate(),
                counts,
            })
        })
        .await
    }

    pub async fn summary(&self) -> DashboardOverview {
        self.read(CacheClass::Metrics, "dashboard_summary", &(), || async {
            let summary = DashboardSummary::fetch(&self.db.pool).await?;
            Ok::<_, DbErr>(DashboardOverview {
                success_rate: summary.success_rate(),
                summary,
            })
        })
        .await
    }

    /// Failed and long-running runs over the last day plus store connectivity.
    pub async fn health_report(&self) -> PipelineHealth {
        let since = Utc::now() - chrono::Duration::hours(HEALTH_LOOKBACK_HOURS);
        let limit = self.limits.max_limit;

        let ping = self
            .read(CacheClass::Health, "ping", &(), || async {
                let elapsed = self.db.ping().await?;
                Ok::<_, DbErr>(Some(elapsed.as_secs_f64() * 1000.0))
            })
            .await;
        let failed_runs = self
            .read(CacheClass::Health, "failed_runs_24h", &limit, || async {
                EtlRun::find_failed_since(&self.db.pool, since, limit).await
            })
            .await;
        let long_running_runs = self
            .read(CacheClass::Health, "long_running_runs_24h", &limit, || async {
                EtlRun::find_long_running_since(&self.db.pool, since, LONG_RUNNING_MINUTES, limit)
                    .await
            })
            .await;

        let database_connected = ping.is_some();
        let alert = failed_runs.len() as u64 >= self.failure_threshold;
        let status = if !database_connected {
            PipelineState::Unhealthy
        } else if alert || !long_running_runs.is_empty() || !failed_runs.is_empty() {
            PipelineState::Degraded
        } else {
            PipelineState::Healthy
        };
        if alert {
            tracing::warn!(
                failed_runs = failed_runs.len(),
                threshold = self.failure_threshold,
                "Failed run threshold reached"
            );
        }

        PipelineHealth {
            status,
            checked_at: Some(Utc::now()),
            database_connected,
            ping_ms: ping.map(|ms| (ms * 100.0).round() / 100.0),
            failed_runs,
            long_running_runs,
            failure_threshold: self.failure_threshold,
            alert,
        }
    }

    pub async fn table_status(&self) -> TableStatusReport {
        let tables = self.monitored_tables.clone();
        let names: Vec<&str> = tables.iter().map(|table| table.name.as_str()).collect();
        self.read(CacheClass::Metrics, "table_status", &names, || async {
            collect_table_status(self.catalog.as_ref(), &tables, Utc::now()).await
        })
        .await
    }

    /// Latency of one store round trip, bypassing the cache.
    pub async fn ping(&self) -> Result<Duration, StorageError> {
        with_timeout(self.query_timeout, async {
            self.db.ping().await.map_err(StorageError::from)
        })
        .await
    }
}
