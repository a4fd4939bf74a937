use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectionTrait, DbErr, FromQueryResult,
    sea_query::{Alias, Asterisk, Query},
};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::job_stats::success_rate;

pub const DASHBOARD_SUMMARY_VIEW: &str = "etl_dashboard_summary";

/// Run totals over the trailing seven days, read from the summary view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromQueryResult, TS)]
pub struct DashboardSummary {
    pub total_runs: i64,
    pub successful_runs: i64,
    pub failed_runs: i64,
    pub running_runs: i64,
    pub avg_duration_minutes: Option<f64>,
    pub last_run_time: Option<DateTime<Utc>>,
    pub total_rows_processed: i64,
}

impl DashboardSummary {
    pub async fn fetch<C: ConnectionTrait>(db: &C) -> Result<Self, DbErr> {
        let query = Query::select()
            .column(Asterisk)
            .from(Alias::new(DASHBOARD_SUMMARY_VIEW))
            .to_owned();

        let summary = match db.query_one(&query).await? {
            Some(row) => Self::from_query_result(&row, "")?,
            None => Self::default(),
        };
        Ok(summary)
    }

    pub fn success_rate(&self) -> f64 {
        success_rate(self.successful_runs, self.total_runs)
    }
}
