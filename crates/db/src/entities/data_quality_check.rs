use sea_orm::entity::prelude::*;

use crate::types::{QualityCheckStatus, QualityCheckType};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "data_quality_checks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub check_id: i64,
    pub check_name: String,
    pub table_name: String,
    pub check_type: QualityCheckType,
    pub expected_count: Option<i64>,
    pub actual_count: Option<i64>,
    pub status: QualityCheckStatus,
    pub error_details: Option<String>,
    pub check_time: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
