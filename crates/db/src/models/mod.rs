pub mod dashboard_summary;
pub mod etl_run;
pub mod job_stats;
pub mod quality_check;
