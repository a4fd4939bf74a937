use sea_orm_migration::prelude::*;

mod m20250601000000_etl_tables;
mod m20250601000100_etl_dashboard_summary;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601000000_etl_tables::Migration),
            Box::new(m20250601000100_etl_dashboard_summary::Migration),
        ]
    }
}
