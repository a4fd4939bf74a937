use std::time::Duration;

use db::{
    DBService,
    models::{
        etl_run::{CompleteEtlRun, EtlRun, EtlRunError, RunStatus},
        quality_check::QualityCheckError,
    },
};
use thiserror::Error;
use tokio_util::task::TaskTracker;

use super::{
    notifier::AlertNotifier,
    storage::{StorageError, with_timeout},
};

/// Write-path failures surfaced to callers.
#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("ETL run {0} has already completed")]
    AlreadyCompleted(i64),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<EtlRunError> for TrackingError {
    fn from(err: EtlRunError) -> Self {
        match err {
            EtlRunError::Database(err) => TrackingError::Storage(StorageError::Database(err)),
            EtlRunError::NotFound(run_id) => TrackingError::NotFound(format!("ETL run {run_id}")),
            EtlRunError::AlreadyCompleted(run_id) => TrackingError::AlreadyCompleted(run_id),
            EtlRunError::ValidationError(msg) => TrackingError::Validation(msg),
        }
    }
}

impl From<QualityCheckError> for TrackingError {
    fn from(err: QualityCheckError) -> Self {
        match err {
            QualityCheckError::Database(err) => TrackingError::Storage(StorageError::Database(err)),
            QualityCheckError::ValidationError(msg) => TrackingError::Validation(msg),
        }
    }
}

impl From<db::DbErr> for TrackingError {
    fn from(err: db::DbErr) -> Self {
        TrackingError::Storage(StorageError::Database(err))
    }
}

/// Records the start and completion of ETL job runs.
#[derive(Clone)]
pub struct RunTracker {
    db: DBService,
    notifier: AlertNotifier,
    query_timeout: Duration,
    alerts: TaskTracker,
}

impl RunTracker {
    pub fn new(db: DBService, notifier: AlertNotifier, query_timeout: Duration) -> Self {
        Self {
            db,
            notifier,
            query_timeout,
            alerts: TaskTracker::new(),
        }
    }

    pub async fn start(&self, job_name: &str) -> Result<i64, TrackingError> {
        let run_id = with_timeout(self.query_timeout, async {
            EtlRun::start(&self.db.pool, job_name)
                .await
                .map_err(TrackingError::from)
        })
        .await?;
        tracing::info!(run_id, job_name = job_name.trim(), "ETL run started");
        Ok(run_id)
    }

    /// Completes a running run. Failed runs trigger a background alert once committed.
    pub async fn complete(
        &self,
        run_id: i64,
        data: CompleteEtlRun,
    ) -> Result<EtlRun, TrackingError> {
        let run = with_timeout(self.query_timeout, async {
            EtlRun::complete(&self.db.pool, run_id, &data)
                .await
                .map_err(TrackingError::from)
        })
        .await?;

        tracing::info!(
            run_id,
            job_name = %run.job_name,
            status = %run.status,
            rows_processed = run.rows_processed,
            duration_minutes = run.duration_minutes,
            "ETL run completed"
        );

        if run.status == RunStatus::Failed && self.notifier.is_enabled() {
            let notifier = self.notifier.clone();
            let failed = run.clone();
            self.alerts.spawn(async move {
                notifier.notify_run_failed(&failed).await;
            });
        }

        Ok(run)
    }

    /// Waits for failure alerts that are still being delivered.
    pub async fn drain_alerts(&self) {
        self.alerts.close();
        if !self.alerts.is_empty() {
            tracing::info!(pending = self.alerts.len(), "Waiting for in-flight alerts");
        }
        self.alerts.wait().await;
    }

    pub async fn find(&self, run_id: i64) -> Result<EtlRun, TrackingError> {
        with_timeout(self.query_timeout, async {
            EtlRun::find_by_id(&self.db.pool, run_id)
                .await?
                .ok_or_else(|| TrackingError::NotFound(format!("ETL run {run_id}")))
        })
        .await
    }
}
