//! Optional database analytics (schema validation, query optimization hints).
//!
//! Providers are chosen when the deployment is assembled. The built-in one reads the
//! database catalog (see [`super::catalog`]); without any provider [`NullAnalytics`]
//! reports the capability as unavailable.

use async_trait::async_trait;
use db::DbErr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

use super::{catalog::CatalogSnapshot, storage::StorageError};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("Analytics provider failed: {0}")]
    Provider(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<DbErr> for AnalyticsError {
    fn from(err: DbErr) -> Self {
        AnalyticsError::Storage(StorageError::Database(err))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct AnalyticsFinding {
    pub category: String,
    pub severity: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
pub struct AnalyticsReport {
    pub provider: String,
    pub available: bool,
    pub findings: Vec<AnalyticsFinding>,
    pub recommendations: Vec<String>,
    /// Raw catalog figures behind the findings, when the provider reads the catalog.
    pub catalog: Option<CatalogSnapshot>,
}

#[async_trait]
pub trait AnalyticsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self) -> Result<AnalyticsReport, AnalyticsError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnalytics;

#[async_trait]
impl AnalyticsProvider for NullAnalytics {
    fn name(&self) -> &str {
        "none"
    }

    async fn analyze(&self) -> Result<AnalyticsReport, AnalyticsError> {
        Ok(AnalyticsReport {
            provider: self.name().to_string(),
            available: false,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_provider_reports_unavailable() {
        let provider: Box<dyn AnalyticsProvider> = Box::new(NullAnalytics);
        let report = provider.analyze().await.unwrap();
        assert!(!report.available);
        assert_eq!(report.provider, "none");
        assert!(report.findings.is_empty());
    }
}
