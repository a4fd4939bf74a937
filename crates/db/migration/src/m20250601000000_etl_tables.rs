use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(EtlRuns::Table)
                    .col(pk_id_col(manager, EtlRuns::RunId))
                    .col(
                        ColumnDef::new(EtlRuns::JobName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(timestamp_col(EtlRuns::StartTime))
                    .col(ColumnDef::new(EtlRuns::EndTime).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(EtlRuns::Status)
                            .string_len(32)
                            .not_null()
                            .default(Expr::val("running")),
                    )
                    .col(counter_col(EtlRuns::RowsProcessed))
                    .col(
                        ColumnDef::new(EtlRuns::MemoryUsedMb)
                            .double()
                            .not_null()
                            .default(Expr::val(0.0)),
                    )
                    .col(ColumnDef::new(EtlRuns::ErrorMessage).text())
                    .col(ColumnDef::new(EtlRuns::DurationMinutes).double())
                    .col(timestamp_col(EtlRuns::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_etl_runs_start_time")
                    .table(EtlRuns::Table)
                    .col(EtlRuns::StartTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_etl_runs_job_name_start_time")
                    .table(EtlRuns::Table)
                    .col(EtlRuns::JobName)
                    .col(EtlRuns::StartTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_etl_runs_status")
                    .table(EtlRuns::Table)
                    .col(EtlRuns::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(EtlJobStats::Table)
                    .col(
                        ColumnDef::new(EtlJobStats::JobName)
                            .string_len(255)
                            .not_null()
                            .primary_key(),
                    )
                    .col(counter_col(EtlJobStats::TotalRuns))
                    .col(counter_col(EtlJobStats::SuccessfulRuns))
                    .col(counter_col(EtlJobStats::FailedRuns))
                    .col(ColumnDef::new(EtlJobStats::AvgDurationMinutes).double())
                    .col(ColumnDef::new(EtlJobStats::LastRunTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(EtlJobStats::LastRunStatus).string_len(32))
                    .col(counter_col(EtlJobStats::TotalRowsProcessed))
                    .col(timestamp_col(EtlJobStats::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .if_not_exists()
                    .table(DataQualityChecks::Table)
                    .col(pk_id_col(manager, DataQualityChecks::CheckId))
                    .col(
                        ColumnDef::new(DataQualityChecks::CheckName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DataQualityChecks::TableName)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DataQualityChecks::CheckType)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DataQualityChecks::ExpectedCount).big_integer())
                    .col(ColumnDef::new(DataQualityChecks::ActualCount).big_integer())
                    .col(
                        ColumnDef::new(DataQualityChecks::Status)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(DataQualityChecks::ErrorDetails).text())
                    .col(timestamp_col(DataQualityChecks::CheckTime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_data_quality_checks_check_time")
                    .table(DataQualityChecks::Table)
                    .col(DataQualityChecks::CheckTime)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_data_quality_checks_table_name")
                    .table(DataQualityChecks::Table)
                    .col(DataQualityChecks::TableName)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(DataQualityChecks::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EtlJobStats::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EtlRuns::Table).to_owned())
            .await?;
        Ok(())
    }
}

fn pk_id_col<T: Iden>(manager: &SchemaManager, col: T) -> ColumnDef {
    let mut col = ColumnDef::new(col);
    match manager.get_database_backend() {
        DatabaseBackend::Sqlite => {
            col.integer();
        }
        _ => {
            col.big_integer();
        }
    }
    col.not_null().auto_increment().primary_key().to_owned()
}

fn counter_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .big_integer()
        .not_null()
        .default(Expr::val(0))
        .to_owned()
}

fn timestamp_col<T: Iden>(col: T) -> ColumnDef {
    ColumnDef::new(col)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[derive(Iden)]
enum EtlRuns {
    Table,
    RunId,
    JobName,
    StartTime,
    EndTime,
    Status,
    RowsProcessed,
    MemoryUsedMb,
    ErrorMessage,
    DurationMinutes,
    CreatedAt,
}

#[derive(Iden)]
enum EtlJobStats {
    Table,
    JobName,
    TotalRuns,
    SuccessfulRuns,
    FailedRuns,
    AvgDurationMinutes,
    LastRunTime,
    LastRunStatus,
    TotalRowsProcessed,
    UpdatedAt,
}

#[derive(Iden)]
enum DataQualityChecks {
    Table,
    CheckId,
    CheckName,
    TableName,
    CheckType,
    ExpectedCount,
    ActualCount,
    Status,
    ErrorDetails,
    CheckTime,
}
