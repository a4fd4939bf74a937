pub mod dashboard;
pub mod health;
pub mod jobs;
pub mod performance;
pub mod quality_checks;
pub mod runs;
pub mod tables;
