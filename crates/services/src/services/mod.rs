pub mod analytics;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod notifier;
pub mod performance;
pub mod quality_checks;
pub mod query_cache;
pub mod run_tracker;
pub mod storage;
pub mod table_status;
