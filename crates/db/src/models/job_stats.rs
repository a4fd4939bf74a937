use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{entities::etl_job_stats, types::RunStatus};

/// Rolling per-job statistics maintained by the run lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct JobStats {
    pub job_name: String,
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub avg_duration_minutes: Option<f64>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunStatus>,
    pub total_rows_processed: i64,
    pub updated_at: DateTime<Utc>,
    /// Percentage of all started runs that succeeded.
    pub success_rate: f64,
}

impl JobStats {
    fn from_model(model: etl_job_stats::Model) -> Self {
        Self {
            success_rate: success_rate(model.successful_runs, model.total_runs),
            job_name: model.job_name,
            total_runs: model.total_runs,
            successful_runs: model.successful_runs,
            failed_runs: model.failed_runs,
            avg_duration_minutes: model.avg_duration_minutes,
            last_run_time: model.last_run_time,
            last_run_status: model.last_run_status,
            total_rows_processed: model.total_rows_processed,
            updated_at: model.updated_at,
        }
    }

    pub async fn find_by_job_name<C: ConnectionTrait>(
        db: &C,
        job_name: &str,
    ) -> Result<Option<Self>, DbErr> {
        let record = etl_job_stats::Entity::find_by_id(job_name.to_string())
            .one(db)
            .await?;
        Ok(record.map(Self::from_model))
    }

    /// Jobs ordered by most recent activity.
    pub async fn list<C: ConnectionTrait>(db: &C, limit: u64) -> Result<Vec<Self>, DbErr> {
        let records = etl_job_stats::Entity::find()
            .order_by_desc(etl_job_stats::Column::LastRunTime)
            .order_by_asc(etl_job_stats::Column::JobName)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Jobs whose last run started at or after `since`.
    pub async fn list_active_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = etl_job_stats::Entity::find()
            .filter(etl_job_stats::Column::LastRunTime.gte(since))
            .order_by_desc(etl_job_stats::Column::LastRunTime)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }
}

/// `successful / total` as a percentage with one decimal; zero when nothing ran.
pub fn success_rate(successful: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    (successful as f64 / total as f64 * 1000.0).round() / 10.0
}
