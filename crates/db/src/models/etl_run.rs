use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set, TransactionSession, TransactionTrait,
    sea_query::{Alias, Expr, ExprTrait, Func, OnConflict, Query},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

pub use crate::types::RunStatus;
use crate::{
    entities::{etl_job_stats, etl_run},
    retry::{BusyError, retry_on_sqlite_busy},
};

#[derive(Debug, Error)]
pub enum EtlRunError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("ETL run {0} not found")]
    NotFound(i64),
    #[error("ETL run {0} has already completed")]
    AlreadyCompleted(i64),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl BusyError for EtlRunError {
    fn is_sqlite_busy(&self) -> bool {
        match self {
            EtlRunError::Database(err) => err.is_sqlite_busy(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct EtlRun {
    pub run_id: i64,
    pub job_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub rows_processed: i64,
    pub memory_used_mb: f64,
    pub error_message: Option<String>,
    pub duration_minutes: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CompleteEtlRun {
    pub status: RunStatus,
    #[serde(default)]
    pub rows_processed: i64,
    #[serde(default)]
    pub memory_used_mb: f64,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Bounded listing of runs. `since` is mandatory so every listing is windowed.
#[derive(Debug, Clone)]
pub struct RunQuery {
    pub job_name: Option<String>,
    pub status: Option<RunStatus>,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u64,
}

impl EtlRun {
    fn from_model(model: etl_run::Model) -> Self {
        Self {
            run_id: model.run_id,
            job_name: model.job_name,
            start_time: model.start_time,
            end_time: model.end_time,
            status: model.status,
            rows_processed: model.rows_processed,
            memory_used_mb: model.memory_used_mb,
            error_message: model.error_message,
            duration_minutes: model.duration_minutes,
            created_at: model.created_at,
        }
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        db: &C,
        run_id: i64,
    ) -> Result<Option<Self>, DbErr> {
        let record = etl_run::Entity::find_by_id(run_id).one(db).await?;
        Ok(record.map(Self::from_model))
    }

    pub async fn list<C: ConnectionTrait>(db: &C, query: &RunQuery) -> Result<Vec<Self>, DbErr> {
        let mut select =
            etl_run::Entity::find().filter(etl_run::Column::StartTime.gte(query.since));
        if let Some(until) = query.until {
            select = select.filter(etl_run::Column::StartTime.lte(until));
        }
        if let Some(job_name) = &query.job_name {
            select = select.filter(etl_run::Column::JobName.eq(job_name.as_str()));
        }
        if let Some(status) = query.status {
            select = select.filter(etl_run::Column::Status.eq(status));
        }

        let records = select
            .order_by_desc(etl_run::Column::StartTime)
            .limit(query.limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Failed runs that started at or after `since`, newest first.
    pub async fn find_failed_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = etl_run::Entity::find()
            .filter(etl_run::Column::Status.eq(RunStatus::Failed))
            .filter(etl_run::Column::StartTime.gte(since))
            .order_by_desc(etl_run::Column::StartTime)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Completed runs since `since` whose duration exceeded `min_minutes`, longest first.
    pub async fn find_long_running_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
        min_minutes: f64,
        limit: u64,
    ) -> Result<Vec<Self>, DbErr> {
        let records = etl_run::Entity::find()
            .filter(etl_run::Column::StartTime.gte(since))
            .filter(etl_run::Column::DurationMinutes.gt(min_minutes))
            .order_by_desc(etl_run::Column::DurationMinutes)
            .limit(limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Records a new `running` run and bumps the job aggregate in one transaction.
    pub async fn start<C: TransactionTrait>(db: &C, job_name: &str) -> Result<i64, EtlRunError> {
        let job_name = job_name.trim();
        if job_name.is_empty() {
            return Err(EtlRunError::ValidationError(
                "job_name must not be empty".to_string(),
            ));
        }

        retry_on_sqlite_busy(|| Self::start_once(db, job_name)).await
    }

    async fn start_once<C: TransactionTrait>(db: &C, job_name: &str) -> Result<i64, EtlRunError> {
        let now = Utc::now();
        let tx = db.begin().await?;

        let run = etl_run::ActiveModel {
            job_name: Set(job_name.to_string()),
            start_time: Set(now),
            end_time: Set(None),
            status: Set(RunStatus::Running),
            rows_processed: Set(0),
            memory_used_mb: Set(0.0),
            error_message: Set(None),
            duration_minutes: Set(None),
            created_at: Set(now),
            ..Default::default()
        }
        .insert(&tx)
        .await?;

        let stats = etl_job_stats::ActiveModel {
            job_name: Set(job_name.to_string()),
            total_runs: Set(1),
            successful_runs: Set(0),
            failed_runs: Set(0),
            avg_duration_minutes: Set(None),
            last_run_time: Set(Some(now)),
            last_run_status: Set(None),
            total_rows_processed: Set(0),
            updated_at: Set(now),
        };
        etl_job_stats::Entity::insert(stats)
            .on_conflict(
                OnConflict::column(etl_job_stats::Column::JobName)
                    .value(
                        etl_job_stats::Column::TotalRuns,
                        Expr::col((etl_job_stats::Entity, etl_job_stats::Column::TotalRuns)).add(1),
                    )
                    .update_columns([
                        etl_job_stats::Column::LastRunTime,
                        etl_job_stats::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(run_id = run.run_id, job_name, "ETL run started");
        Ok(run.run_id)
    }

    /// Completes a `running` run and folds its outcome into the job aggregate.
    ///
    /// A run can only be completed once; later calls fail with
    /// [`EtlRunError::AlreadyCompleted`] and leave the aggregate untouched.
    pub async fn complete<C: TransactionTrait>(
        db: &C,
        run_id: i64,
        data: &CompleteEtlRun,
    ) -> Result<EtlRun, EtlRunError> {
        if !data.status.is_terminal() {
            return Err(EtlRunError::ValidationError(format!(
                "status must be success or failed, got {}",
                data.status
            )));
        }
        if data.rows_processed < 0 {
            return Err(EtlRunError::ValidationError(
                "rows_processed must not be negative".to_string(),
            ));
        }
        if !data.memory_used_mb.is_finite() || data.memory_used_mb < 0.0 {
            return Err(EtlRunError::ValidationError(
                "memory_used_mb must be a non-negative number".to_string(),
            ));
        }

        retry_on_sqlite_busy(|| Self::complete_once(db, run_id, data)).await
    }

    async fn complete_once<C: TransactionTrait>(
        db: &C,
        run_id: i64,
        data: &CompleteEtlRun,
    ) -> Result<EtlRun, EtlRunError> {
        let tx = db.begin().await?;
        let end_time = Utc::now();

        // Writing first takes the write lock before anything is read, and the status
        // guard makes the transition happen at most once.
        let updated = etl_run::Entity::update_many()
            .col_expr(etl_run::Column::EndTime, Expr::value(end_time))
            .col_expr(etl_run::Column::Status, Expr::value(data.status.to_string()))
            .col_expr(etl_run::Column::RowsProcessed, Expr::value(data.rows_processed))
            .col_expr(etl_run::Column::MemoryUsedMb, Expr::value(data.memory_used_mb))
            .col_expr(etl_run::Column::ErrorMessage, Expr::value(data.error_message.clone()))
            .filter(etl_run::Column::RunId.eq(run_id))
            .filter(etl_run::Column::Status.eq(RunStatus::Running))
            .exec(&tx)
            .await?;

        let record = etl_run::Entity::find_by_id(run_id)
            .one(&tx)
            .await?
            .ok_or(EtlRunError::NotFound(run_id))?;
        if updated.rows_affected == 0 {
            return Err(EtlRunError::AlreadyCompleted(run_id));
        }

        let duration_minutes = duration_minutes(record.start_time, end_time);
        etl_run::Entity::update_many()
            .col_expr(etl_run::Column::DurationMinutes, Expr::value(duration_minutes))
            .filter(etl_run::Column::RunId.eq(run_id))
            .exec(&tx)
            .await?;

        let job_name = record.job_name.clone();
        let locked = etl_job_stats::Entity::find_by_id(job_name.clone())
            .lock_exclusive()
            .one(&tx)
            .await?;
        if locked.is_none() {
            tracing::warn!(run_id, job_name, "job aggregate missing; recreating");
            etl_job_stats::Entity::insert(etl_job_stats::ActiveModel {
                job_name: Set(job_name.clone()),
                total_runs: Set(1),
                successful_runs: Set(0),
                failed_runs: Set(0),
                avg_duration_minutes: Set(None),
                last_run_time: Set(Some(record.start_time)),
                last_run_status: Set(None),
                total_rows_processed: Set(0),
                updated_at: Set(end_time),
            })
            .exec_without_returning(&tx)
            .await?;
        }

        let avg_duration = average_completed_duration(&tx, &job_name).await?;
        let outcome_column = match data.status {
            RunStatus::Failed => etl_job_stats::Column::FailedRuns,
            _ => etl_job_stats::Column::SuccessfulRuns,
        };

        etl_job_stats::Entity::update_many()
            .col_expr(outcome_column, Expr::col(outcome_column).add(1))
            .col_expr(
                etl_job_stats::Column::TotalRowsProcessed,
                Expr::col(etl_job_stats::Column::TotalRowsProcessed).add(data.rows_processed),
            )
            .col_expr(etl_job_stats::Column::AvgDurationMinutes, Expr::value(avg_duration))
            .col_expr(
                etl_job_stats::Column::LastRunStatus,
                Expr::value(data.status.to_string()),
            )
            .col_expr(etl_job_stats::Column::UpdatedAt, Expr::value(end_time))
            .filter(etl_job_stats::Column::JobName.eq(job_name.as_str()))
            .exec(&tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(
            run_id,
            job_name,
            status = %data.status,
            duration_minutes,
            "ETL run completed"
        );

        Ok(EtlRun {
            end_time: Some(end_time),
            duration_minutes: Some(duration_minutes),
            status: data.status,
            rows_processed: data.rows_processed,
            memory_used_mb: data.memory_used_mb,
            error_message: data.error_message.clone(),
            ..Self::from_model(record)
        })
    }
}

async fn average_completed_duration<C: ConnectionTrait>(
    db: &C,
    job_name: &str,
) -> Result<Option<f64>, DbErr> {
    let query = Query::select()
        .expr_as(
            Func::avg(Expr::col((etl_run::Entity, etl_run::Column::DurationMinutes))),
            Alias::new("avg_duration"),
        )
        .from(etl_run::Entity)
        .and_where(Expr::col((etl_run::Entity, etl_run::Column::JobName)).eq(job_name))
        .and_where(Expr::col((etl_run::Entity, etl_run::Column::DurationMinutes)).is_not_null())
        .to_owned();

    let avg = db
        .query_one(&query)
        .await?
        .and_then(|row| row.try_get::<Option<f64>>("", "avg_duration").ok())
        .flatten();
    Ok(avg.map(round_minutes))
}

/// Elapsed minutes between two instants, rounded to two decimals.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = Ord::max((end - start).num_milliseconds(), 0) as f64;
    round_minutes(millis / 60_000.0)
}

fn round_minutes(minutes: f64) -> f64 {
    (minutes * 100.0).round() / 100.0
}
