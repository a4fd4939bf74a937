use std::{future::Future, time::Duration};

use db::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Runs a store operation under a deadline.
pub async fn with_timeout<T, E, Fut>(limit: Duration, op: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: From<StorageError>,
{
    match tokio::time::timeout(limit, op).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(limit).into()),
    }
}
