use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
    sea_query::{Alias, Expr, ExprTrait, Func, Query},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

pub use crate::types::{QualityCheckStatus, QualityCheckType};
use crate::entities::data_quality_check;

#[derive(Debug, Error)]
pub enum QualityCheckError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
pub struct QualityCheck {
    pub check_id: i64,
    pub check_name: String,
    pub table_name: String,
    pub check_type: QualityCheckType,
    pub expected_count: Option<i64>,
    pub actual_count: Option<i64>,
    pub status: QualityCheckStatus,
    pub error_details: Option<String>,
    pub check_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, TS)]
pub struct CreateQualityCheck {
    pub check_name: String,
    pub table_name: String,
    pub check_type: QualityCheckType,
    #[serde(default)]
    pub expected_count: Option<i64>,
    #[serde(default)]
    pub actual_count: Option<i64>,
    pub status: QualityCheckStatus,
    #[serde(default)]
    pub error_details: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QualityCheckQuery {
    pub table_name: Option<String>,
    pub status: Option<QualityCheckStatus>,
    pub check_type: Option<QualityCheckType>,
    pub since: DateTime<Utc>,
    pub until: Option<DateTime<Utc>>,
    pub limit: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct QualityStatusCounts {
    pub total: i64,
    pub passed: i64,
    pub failed: i64,
    pub warning: i64,
    pub pending: i64,
}

impl QualityStatusCounts {
    /// Share of checks that passed, one decimal; zero when nothing ran.
    pub fn pass_rate(&self) -> f64 {
        crate::models::job_stats::success_rate(self.passed, self.total)
    }
}

impl QualityCheck {
    fn from_model(model: data_quality_check::Model) -> Self {
        Self {
            check_id: model.check_id,
            check_name: model.check_name,
            table_name: model.table_name,
            check_type: model.check_type,
            expected_count: model.expected_count,
            actual_count: model.actual_count,
            status: model.status,
            error_details: model.error_details,
            check_time: model.check_time,
        }
    }

    /// Appends one immutable check result.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        data: &CreateQualityCheck,
    ) -> Result<Self, QualityCheckError> {
        let check_name = data.check_name.trim();
        let table_name = data.table_name.trim();
        if check_name.is_empty() {
            return Err(QualityCheckError::ValidationError(
                "check_name must not be empty".to_string(),
            ));
        }
        if table_name.is_empty() {
            return Err(QualityCheckError::ValidationError(
                "table_name must not be empty".to_string(),
            ));
        }

        let model = data_quality_check::ActiveModel {
            check_name: Set(check_name.to_string()),
            table_name: Set(table_name.to_string()),
            check_type: Set(data.check_type),
            expected_count: Set(data.expected_count),
            actual_count: Set(data.actual_count),
            status: Set(data.status),
            error_details: Set(data.error_details.clone()),
            check_time: Set(Utc::now()),
            ..Default::default()
        }
        .insert(db)
        .await?;

        Ok(Self::from_model(model))
    }

    pub async fn list<C: ConnectionTrait>(
        db: &C,
        query: &QualityCheckQuery,
    ) -> Result<Vec<Self>, DbErr> {
        let mut select = data_quality_check::Entity::find()
            .filter(data_quality_check::Column::CheckTime.gte(query.since));
        if let Some(until) = query.until {
            select = select.filter(data_quality_check::Column::CheckTime.lte(until));
        }
        if let Some(table_name) = &query.table_name {
            select = select.filter(data_quality_check::Column::TableName.eq(table_name.as_str()));
        }
        if let Some(status) = query.status {
            select = select.filter(data_quality_check::Column::Status.eq(status));
        }
        if let Some(check_type) = query.check_type {
            select = select.filter(data_quality_check::Column::CheckType.eq(check_type));
        }

        let records = select
            .order_by_desc(data_quality_check::Column::CheckTime)
            .order_by_desc(data_quality_check::Column::CheckId)
            .limit(query.limit)
            .all(db)
            .await?;
        Ok(records.into_iter().map(Self::from_model).collect())
    }

    /// Per-status counts for checks executed at or after `since`.
    pub async fn count_by_status_since<C: ConnectionTrait>(
        db: &C,
        since: DateTime<Utc>,
    ) -> Result<QualityStatusCounts, DbErr> {
        let query = Query::select()
            .column(data_quality_check::Column::Status)
            .expr_as(
                Func::count(Expr::col((
                    data_quality_check::Entity,
                    data_quality_check::Column::CheckId,
                ))),
                Alias::new("check_count"),
            )
            .from(data_quality_check::Entity)
            .and_where(
                Expr::col((data_quality_check::Entity, data_quality_check::Column::CheckTime))
                    .gte(since),
            )
            .group_by_col(data_quality_check::Column::Status)
            .to_owned();

        let mut counts = QualityStatusCounts::default();
        for row in db.query_all(&query).await? {
            let status: String = row.try_get("", "status")?;
            let count: i64 = row.try_get("", "check_count")?;
            counts.total += count;
            match QualityCheckStatus::from_str(&status) {
                Ok(QualityCheckStatus::Passed) => counts.passed += count,
                Ok(QualityCheckStatus::Failed) => counts.failed += count,
                Ok(QualityCheckStatus::Warning) => counts.warning += count,
                Ok(QualityCheckStatus::Pending) => counts.pending += count,
                Err(_) => {
                    tracing::warn!(status, "unknown quality check status in store");
                }
            }
        }
        Ok(counts)
    }
}
