use sea_orm_migration::{prelude::*, sea_orm::DatabaseBackend};

#[derive(DeriveMigrationName)]
pub struct Migration;

const SUMMARY_COLUMNS: &str = r#"
    CAST(COUNT(*) AS BIGINT) AS total_runs,
    CAST(COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0) AS BIGINT) AS successful_runs,
    CAST(COALESCE(SUM(CASE WHEN status = 'failed' THEN 1 ELSE 0 END), 0) AS BIGINT) AS failed_runs,
    CAST(COALESCE(SUM(CASE WHEN status = 'running' THEN 1 ELSE 0 END), 0) AS BIGINT) AS running_runs,
    AVG(CASE WHEN duration_minutes IS NOT NULL THEN duration_minutes END) AS avg_duration_minutes,
    MAX(start_time) AS last_run_time,
    CAST(COALESCE(SUM(rows_processed), 0) AS BIGINT) AS total_rows_processed
"#;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let sql = match manager.get_database_backend() {
            DatabaseBackend::Sqlite => format!(
                "CREATE VIEW IF NOT EXISTS etl_dashboard_summary AS SELECT {SUMMARY_COLUMNS} \
                 FROM etl_runs \
                 WHERE start_time >= strftime('%Y-%m-%dT%H:%M:%S', 'now', '-7 days')"
            ),
            _ => format!(
                "CREATE OR REPLACE VIEW etl_dashboard_summary AS SELECT {SUMMARY_COLUMNS} \
                 FROM etl_runs \
                 WHERE start_time >= NOW() - INTERVAL '7 days'"
            ),
        };
        manager.get_connection().execute_unprepared(&sql).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP VIEW IF EXISTS etl_dashboard_summary")
            .await?;
        Ok(())
    }
}
