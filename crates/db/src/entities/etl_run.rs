use sea_orm::entity::prelude::*;

use crate::types::RunStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "etl_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub run_id: i64,
    pub job_name: String,
    pub start_time: DateTimeUtc,
    pub end_time: Option<DateTimeUtc>,
    pub status: RunStatus,
    pub rows_processed: i64,
    pub memory_used_mb: f64,
    pub error_message: Option<String>,
    pub duration_minutes: Option<f64>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
