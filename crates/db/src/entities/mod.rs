pub mod data_quality_check;
pub mod etl_job_stats;
pub mod etl_run;
