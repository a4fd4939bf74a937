use std::time::Duration;

use db::{
    DBService,
    models::quality_check::{CreateQualityCheck, QualityCheck},
};

use super::{run_tracker::TrackingError, storage::with_timeout};

/// Appends data-quality check outcomes.
#[derive(Clone)]
pub struct QualityCheckRecorder {
    db: DBService,
    query_timeout: Duration,
}

impl QualityCheckRecorder {
    pub fn new(db: DBService, query_timeout: Duration) -> Self {
        Self { db, query_timeout }
    }

    pub async fn record(&self, data: &CreateQualityCheck) -> Result<QualityCheck, TrackingError> {
        let check = with_timeout(self.query_timeout, async {
            QualityCheck::create(&self.db.pool, data)
                .await
                .map_err(TrackingError::from)
        })
        .await?;

        tracing::info!(
            check_id = check.check_id,
            check_name = %check.check_name,
            table_name = %check.table_name,
            status = %check.status,
            "Quality check recorded"
        );
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use db::{
        PoolSettings,
        models::quality_check::{QualityCheckStatus, QualityCheckType},
    };

    use super::*;

    #[tokio::test]
    async fn records_each_execution_separately() {
        let db = DBService::connect("sqlite::memory:", &PoolSettings::default())
            .await
            .unwrap();
        let recorder = QualityCheckRecorder::new(db, Duration::from_secs(5));
        let data = CreateQualityCheck {
            check_name: "duplicate_slugs".to_string(),
            table_name: "FE_DMV_SCORES".to_string(),
            check_type: QualityCheckType::DuplicateCheck,
            expected_count: Some(0),
            actual_count: Some(2),
            status: QualityCheckStatus::Failed,
            error_details: Some("2 duplicate slugs".to_string()),
        };

        let first = recorder.record(&data).await.unwrap();
        let second = recorder.record(&data).await.unwrap();
        assert_ne!(first.check_id, second.check_id);
        assert_eq!(second.error_details.as_deref(), Some("2 duplicate slugs"));

        let blank = CreateQualityCheck {
            table_name: "  ".to_string(),
            ..data
        };
        assert!(matches!(
            recorder.record(&blank).await,
            Err(TrackingError::Validation(_))
        ));
    }
}
